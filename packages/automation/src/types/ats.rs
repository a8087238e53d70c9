//! ATS platform identification.

use serde::{Deserialize, Serialize};

/// The applicant tracking system hosting a job application form.
///
/// Detection happens in the URL validator: either the hostname matches a
/// known ATS domain, or the URL carries a platform-specific query marker
/// (which covers ATS forms embedded on a company's own domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AtsType {
    Greenhouse,
    Lever,
    Workday,
    Ashby,
    Smartrecruiters,
    Icims,
    Taleo,
    Bamboohr,
    Jobvite,
    Workable,
    #[default]
    Unknown,
}

impl AtsType {
    /// Hosted domains for each platform, matched as suffixes.
    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            AtsType::Greenhouse => &["greenhouse.io", "boards.greenhouse.io"],
            AtsType::Lever => &["lever.co", "jobs.lever.co"],
            AtsType::Workday => &["myworkdayjobs.com", "workday.com"],
            AtsType::Ashby => &["ashbyhq.com", "jobs.ashbyhq.com"],
            AtsType::Smartrecruiters => &["smartrecruiters.com"],
            AtsType::Icims => &["icims.com"],
            AtsType::Taleo => &["taleo.net"],
            AtsType::Bamboohr => &["bamboohr.com"],
            AtsType::Jobvite => &["jobvite.com", "jobs.jobvite.com"],
            AtsType::Workable => &["workable.com", "apply.workable.com"],
            AtsType::Unknown => &[],
        }
    }

    /// Query-parameter markers that identify a platform regardless of host.
    pub fn query_markers(&self) -> &'static [&'static str] {
        match self {
            AtsType::Greenhouse => &["gh_jid", "gh_src"],
            AtsType::Lever => &["lever-origin", "lever_origin"],
            AtsType::Workday => &["workday"],
            AtsType::Ashby => &["ashby_jid"],
            AtsType::Smartrecruiters => &["sr_job_id"],
            _ => &[],
        }
    }

    /// All known platforms, in detection priority order.
    pub fn all() -> &'static [AtsType] {
        &[
            AtsType::Greenhouse,
            AtsType::Lever,
            AtsType::Workday,
            AtsType::Ashby,
            AtsType::Smartrecruiters,
            AtsType::Icims,
            AtsType::Taleo,
            AtsType::Bamboohr,
            AtsType::Jobvite,
            AtsType::Workable,
        ]
    }

    /// Stable key used for recipe lookup.
    pub fn as_str(&self) -> &'static str {
        match self {
            AtsType::Greenhouse => "greenhouse",
            AtsType::Lever => "lever",
            AtsType::Workday => "workday",
            AtsType::Ashby => "ashby",
            AtsType::Smartrecruiters => "smartrecruiters",
            AtsType::Icims => "icims",
            AtsType::Taleo => "taleo",
            AtsType::Bamboohr => "bamboohr",
            AtsType::Jobvite => "jobvite",
            AtsType::Workable => "workable",
            AtsType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AtsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AtsType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ats = AtsType::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .unwrap_or(AtsType::Unknown);
        Ok(ats)
    }
}
