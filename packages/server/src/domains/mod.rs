pub mod applications;
pub mod collaborators;
pub mod recipes;
