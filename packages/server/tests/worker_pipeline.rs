//! End-to-end worker pipeline tests over in-memory stores and a mock
//! browser runtime.

use std::sync::Arc;
use std::time::Duration;

use automation::testing::{MockBrowserProvider, MockElement, MockFieldAi, MockPage};
use automation::types::{Recipe, RecipeStep, StepAction, UserProfile};
use automation::{AtsType, BrowserProvider, FieldValueGenerator, FormExtractor, FormFiller};
use serde_json::json;
use uuid::Uuid;

use server_core::domains::applications::{
    Application, ApplicationStatus, ApplicationStore, ApplyMethod, MemoryApplicationStore,
};
use server_core::domains::collaborators::{
    JobPosting, MemoryJobPostingStore, MemoryProfileStore,
};
use server_core::domains::recipes::{MemoryRecipeStore, RecipeStore};
use server_core::kernel::jobs::{
    ApplyCommand, JobPriority, JobQueue, JobStatus, MemoryJobQueue, WorkerPool, WorkerPoolConfig,
};
use server_core::kernel::{ApplicationRunner, RunDecision, RECIPE_ATTEMPT_COST};

const JOB_URL: &str = "https://boards.greenhouse.io/acme/jobs/1234";

const APPLICATION_FORM: &str = r#"
<html><body><form>
  <label for="first_name">First name</label>
  <input id="first_name" name="first_name" type="text" required>
  <label for="last_name">Last name</label>
  <input id="last_name" name="last_name" type="text" required>
  <label for="email">Email address</label>
  <input id="email" name="email" type="email" required>
  <label for="phone">Phone number</label>
  <input id="phone" name="phone" type="tel" required>
  <label for="location">Current location</label>
  <input id="location" name="location" type="text">
  <label for="linkedin">LinkedIn profile</label>
  <input id="linkedin" name="linkedin" type="url">
  <label for="years_experience">Years of experience</label>
  <input id="years_experience" name="years_experience" type="number">
  <input type="radio" name="work_authorization" value="yes" required>
  <input type="radio" name="work_authorization" value="no">
  <input type="radio" name="work_authorization" value="visa">
  <input type="checkbox" name="skills" value="rust">
  <input type="checkbox" name="skills" value="python">
  <label for="notice_period">Notice period</label>
  <select id="notice_period" name="notice_period">
    <option value="">Choose...</option>
    <option value="two_weeks">Two weeks</option>
    <option value="one_month">One month</option>
  </select>
  <label for="pronouns">Pronouns</label>
  <input id="pronouns" name="pronouns" type="text">
  <label for="cover_letter">Why do you want to work here?</label>
  <textarea id="cover_letter" name="cover_letter" required></textarea>
  <button type="submit">Submit application</button>
</form></body></html>
"#;

fn form_page() -> MockPage {
    MockPage::new()
        .with_html(APPLICATION_FORM)
        .with_element("[name=\"first_name\"]", MockElement::text_input())
        .with_element("[name=\"last_name\"]", MockElement::text_input())
        .with_element("[name=\"email\"]", MockElement::text_input())
        .with_element("[name=\"phone\"]", MockElement::text_input())
        .with_element("[name=\"location\"]", MockElement::text_input())
        .with_element("[name=\"linkedin\"]", MockElement::text_input())
        .with_element("[name=\"years_experience\"]", MockElement::text_input())
        .with_element(
            "[name=\"work_authorization\"][value=\"yes\"]",
            MockElement::checkable(),
        )
        .with_element(
            "[name=\"work_authorization\"][value=\"no\"]",
            MockElement::checkable(),
        )
        .with_element(
            "[name=\"work_authorization\"][value=\"visa\"]",
            MockElement::checkable(),
        )
        .with_element("[name=\"skills\"][value=\"rust\"]", MockElement::checkable())
        .with_element("[name=\"skills\"][value=\"python\"]", MockElement::checkable())
        .with_element(
            "[name=\"notice_period\"]",
            MockElement::select(vec![("two_weeks", "Two weeks"), ("one_month", "One month")]),
        )
        .with_element("[name=\"pronouns\"]", MockElement::text_input())
        .with_element("[name=\"cover_letter\"]", MockElement::text_input())
        .with_element("button[type=\"submit\"]", MockElement::clickable())
}

fn full_profile() -> UserProfile {
    let pre_answered = [
        ("First name", "Avery"),
        ("Last name", "Quinn"),
        ("Email address", "avery.quinn@example.com"),
        ("Phone number", "+1 612 555 0133"),
        ("Current location", "Minneapolis, MN"),
        ("LinkedIn profile", "https://linkedin.com/in/averyquinn"),
        ("Years of experience", "6"),
        ("Work authorization", "yes"),
        ("Skills", "rust"),
        ("Notice period", "Two weeks"),
        ("Pronouns", "they/them"),
        (
            "Why do you want to work here?",
            "I have shipped production Rust services for six years.",
        ),
    ]
    .into_iter()
    .map(|(q, a)| (q.to_string(), a.to_string()))
    .collect();

    UserProfile::new(json!({
        "personal": {
            "first_name": "Avery",
            "last_name": "Quinn",
            "email": "avery.quinn@example.com"
        }
    }))
    .with_pre_answered(pre_answered)
    .with_summary("Senior Rust engineer, 6 years of backend experience")
}

struct Harness {
    runner: ApplicationRunner,
    applications: Arc<MemoryApplicationStore>,
    recipes: Arc<MemoryRecipeStore>,
    provider: MockBrowserProvider,
    ai: MockFieldAi,
    user_id: Uuid,
    job_id: Uuid,
}

impl Harness {
    fn new(page: MockPage) -> Self {
        Self::with_parts(MockBrowserProvider::new().with_page(page), MockFieldAi::new(), None)
    }

    fn with_parts(
        provider: MockBrowserProvider,
        ai: MockFieldAi,
        recipe: Option<Recipe>,
    ) -> Self {
        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        let mut recipes = MemoryRecipeStore::new();
        if let Some(recipe) = recipe {
            recipes = recipes.with_recipe(recipe);
        }
        let recipes = Arc::new(recipes);
        let applications = Arc::new(MemoryApplicationStore::with_recipes(recipes.shared()));

        let profiles = MemoryProfileStore::new().with_profile(user_id, full_profile());
        let postings = MemoryJobPostingStore::new().with_posting(JobPosting {
            id: job_id,
            url: JOB_URL.to_string(),
            description: "Senior Rust Engineer building backend services".to_string(),
            open: true,
        });

        let runner = ApplicationRunner::new(
            applications.clone(),
            recipes.clone(),
            Arc::new(profiles),
            Arc::new(postings),
            Arc::new(provider.clone()),
            Arc::new(ai.clone()),
            std::env::temp_dir().join(format!("screenshots-{}", Uuid::new_v4())),
        );

        Self {
            runner,
            applications,
            recipes,
            provider,
            ai,
            user_id,
            job_id,
        }
    }

    async fn seed_application(&self, url: &str) -> ApplyCommand {
        self.seed_with_retries(url, 0).await
    }

    async fn seed_with_retries(&self, url: &str, retry_count: i32) -> ApplyCommand {
        let ats = automation::UrlValidator::new()
            .validate(url)
            .map(|v| v.ats)
            .unwrap_or(AtsType::Unknown);
        let application = Application::builder()
            .user_id(self.user_id)
            .job_id(self.job_id)
            .job_url(url.to_string())
            .ats(ats.as_str().to_string())
            .retry_count(retry_count)
            .build();
        let application = self.applications.create(&application).await.unwrap();
        ApplyCommand {
            application_id: application.id,
            user_id: application.user_id,
            job_id: application.job_id,
            job_url: application.job_url,
            ats: application.ats,
        }
    }

    async fn application(&self, id: Uuid) -> Application {
        self.applications.find(id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn full_form_is_filled_and_submitted() {
    let page = form_page();
    let harness = Harness::new(page.clone());
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    assert!(matches!(decision, RunDecision::Completed));

    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert_eq!(application.method, Some(ApplyMethod::Ai));
    assert!(application.confirmation_id.is_some());
    assert!(application.confirmation_screenshot.is_some());
    assert!(application.submitted_at.is_some());
    assert!(application.error_kind.is_none());

    // Every field came from the pre-answered map; no LLM call was needed.
    assert_eq!(harness.ai.call_count(), 0);

    assert_eq!(page.value_of("[name=\"first_name\"]").as_deref(), Some("Avery"));
    assert_eq!(
        page.value_of("[name=\"email\"]").as_deref(),
        Some("avery.quinn@example.com")
    );
    assert!(page.is_checked("[name=\"work_authorization\"][value=\"yes\"]"));
    assert!(!page.is_checked("[name=\"work_authorization\"][value=\"no\"]"));
    assert!(page.is_checked("[name=\"skills\"][value=\"rust\"]"));
    assert_eq!(
        page.value_of("[name=\"notice_period\"]").as_deref(),
        Some("two_weeks")
    );
    assert!(page.was_clicked("button[type=\"submit\"]"));

    // Browser torn down after the job.
    assert_eq!(harness.provider.active_count(), 0);
}

#[tokio::test]
async fn private_address_fails_before_browser_launch() {
    let harness = Harness::new(form_page());
    let command = harness.seed_application("http://192.168.1.40/jobs/1").await;

    let decision = harness.runner.run(&command).await.unwrap();
    match decision {
        RunDecision::Failed { kind, .. } => assert_eq!(kind.as_str(), "invalid_url"),
        other => panic!("expected terminal failure, got {other:?}"),
    }

    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Failed);
    assert_eq!(application.error_kind.as_deref(), Some("invalid_url"));
    assert_eq!(application.cost, 0.0);

    // No browser was ever acquired.
    assert_eq!(harness.provider.acquire_count(), 0);
}

#[tokio::test]
async fn stale_recipe_falls_back_to_ai_in_same_attempt() {
    // The recipe's required selector no longer exists on the page.
    let recipe = Recipe::new(
        AtsType::Greenhouse,
        vec![
            RecipeStep::new(StepAction::Type, "[name=\"legacy_first_name\"]")
                .with_value("{{personal.first_name}}")
                .required(),
            RecipeStep::new(StepAction::Click, "button[type=\"submit\"]").required(),
        ],
    );
    let recipe_id = recipe.id;

    let page = form_page();
    let harness = Harness::with_parts(
        MockBrowserProvider::new().with_page(page.clone()),
        MockFieldAi::new(),
        Some(recipe),
    );
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    assert!(matches!(decision, RunDecision::Completed));

    // Submitted through the AI path in the same invocation.
    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert_eq!(application.method, Some(ApplyMethod::Ai));
    assert!(page.was_clicked("button[type=\"submit\"]"));

    // The failed replay was recorded against the recipe.
    let recipe = harness.recipes.find(recipe_id).await.unwrap().unwrap();
    assert_eq!(recipe.consecutive_failures, 1);
    assert_eq!(recipe.times_used, 1);
    let executions = harness.recipes.executions(recipe_id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert!(!executions[0].success);
    assert!(executions[0].error.as_deref().unwrap().contains("legacy_first_name"));
}

#[tokio::test]
async fn usable_recipe_is_preferred_over_ai() {
    let recipe = Recipe::new(
        AtsType::Greenhouse,
        vec![
            RecipeStep::new(StepAction::Type, "[name=\"first_name\"]")
                .with_value("{{personal.first_name}}")
                .required(),
            RecipeStep::new(StepAction::Type, "[name=\"email\"]")
                .with_value("{{personal.email}}")
                .required(),
            RecipeStep::new(StepAction::Click, "button[type=\"submit\"]").required(),
        ],
    );
    let recipe_id = recipe.id;

    let page = form_page();
    let ai = MockFieldAi::new();
    let harness = Harness::with_parts(
        MockBrowserProvider::new().with_page(page.clone()),
        ai.clone(),
        Some(recipe),
    );
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    assert!(matches!(decision, RunDecision::Completed));

    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert_eq!(application.method, Some(ApplyMethod::Recipe));
    assert!((application.cost - RECIPE_ATTEMPT_COST).abs() < 1e-9);
    assert_eq!(page.value_of("[name=\"first_name\"]").as_deref(), Some("Avery"));
    assert_eq!(ai.call_count(), 0);

    let recipe = harness.recipes.find(recipe_id).await.unwrap().unwrap();
    assert_eq!(recipe.times_used, 1);
    assert_eq!(recipe.consecutive_failures, 0);
    assert!((recipe.success_rate - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn replay_that_runs_no_steps_counts_as_a_failed_replay() {
    // Every step is optional and none of the selectors exist anymore, so
    // the engine returns cleanly without filling anything.
    let recipe = Recipe::new(
        AtsType::Greenhouse,
        vec![
            RecipeStep::new(StepAction::Type, "[name=\"old_first_name\"]")
                .with_value("{{personal.first_name}}"),
            RecipeStep::new(StepAction::Click, "#legacy-submit"),
        ],
    );
    let recipe_id = recipe.id;

    let page = form_page();
    let harness = Harness::with_parts(
        MockBrowserProvider::new().with_page(page.clone()),
        MockFieldAi::new(),
        Some(recipe),
    );
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    assert!(matches!(decision, RunDecision::Completed));

    // Submission happened through the AI path.
    let application = harness.application(command.application_id).await;
    assert_eq!(application.method, Some(ApplyMethod::Ai));
    assert!(page.was_clicked("button[type=\"submit\"]"));

    // An empty pass is a failed replay, not a success.
    let recipe = harness.recipes.find(recipe_id).await.unwrap().unwrap();
    assert_eq!(recipe.times_used, 1);
    assert_eq!(recipe.consecutive_failures, 1);
    assert_eq!(recipe.success_rate, 0.0);
    let executions = harness.recipes.executions(recipe_id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert!(!executions[0].success);
    assert!(executions[0]
        .error
        .as_deref()
        .unwrap()
        .contains("no recipe step"));
}

#[tokio::test]
async fn browser_crash_during_replay_is_not_charged_to_the_recipe() {
    let recipe = Recipe::new(
        AtsType::Greenhouse,
        vec![
            RecipeStep::new(StepAction::Type, "[name=\"first_name\"]")
                .with_value("{{personal.first_name}}")
                .required(),
            RecipeStep::new(StepAction::Click, "button[type=\"submit\"]").required(),
        ],
    );
    let recipe_id = recipe.id;

    let page = form_page().with_crash_on("[name=\"first_name\"]");
    let harness = Harness::with_parts(
        MockBrowserProvider::new().with_page(page.clone()),
        MockFieldAi::new(),
        Some(recipe),
    );
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    match decision {
        RunDecision::Retry { kind, .. } => assert_eq!(kind.as_str(), "browser_crash"),
        other => panic!("expected retry, got {other:?}"),
    }

    // No AI fallback: a crashed session would fail that path too.
    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Retrying);
    assert_eq!(application.error_kind.as_deref(), Some("browser_crash"));
    assert!(!page.was_clicked("button[type=\"submit\"]"));

    // The recipe's statistics are untouched by an infrastructure failure.
    let recipe = harness.recipes.find(recipe_id).await.unwrap().unwrap();
    assert_eq!(recipe.times_used, 0);
    assert_eq!(recipe.consecutive_failures, 0);
    assert!(harness
        .recipes
        .executions(recipe_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn fill_pass_accounts_for_every_field_with_no_skips() {
    let page = form_page();
    let ai = MockFieldAi::new();

    let form = FormExtractor::new().extract(&page).await.unwrap();
    assert_eq!(form.fields.len(), 12);

    let values = FieldValueGenerator::new(ai.clone())
        .generate(&form.fields, &full_profile(), "Senior Rust Engineer")
        .await
        .unwrap();
    let result = FormFiller::new()
        .fill(&page, &form.fields, &values)
        .await
        .unwrap();

    assert_eq!(result.filled_count(), 12);
    assert_eq!(result.skipped_count(), 0);
    assert_eq!(result.error_count(), 0);
    assert_eq!(ai.call_count(), 0);
}

#[tokio::test]
async fn captcha_page_schedules_a_retry() {
    let page = MockPage::new().with_html(
        r#"<html><body><form>
          <input name="email" type="email" required>
          <div class="g-recaptcha" data-sitekey="abc"></div>
        </form></body></html>"#,
    );
    let harness = Harness::new(page);
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    match decision {
        RunDecision::Retry { kind, delay, .. } => {
            assert_eq!(kind.as_str(), "captcha_timeout");
            assert!(delay > Duration::ZERO);
        }
        other => panic!("expected retry, got {other:?}"),
    }

    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Retrying);
    assert_eq!(application.retry_count, 1);
    assert_eq!(harness.provider.active_count(), 0);
}

#[tokio::test]
async fn retry_budget_exhaustion_is_terminal() {
    let page = MockPage::new().with_html(
        r#"<html><body><form>
          <input name="email" type="email" required>
          <div class="g-recaptcha" data-sitekey="abc"></div>
        </form></body></html>"#,
    );
    let harness = Harness::new(page);
    // Second attempt of a policy that allows two.
    let command = harness.seed_with_retries(JOB_URL, 1).await;

    let decision = harness.runner.run(&command).await.unwrap();
    assert!(matches!(decision, RunDecision::Failed { .. }));

    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Failed);
    assert_eq!(application.error_kind.as_deref(), Some("captcha_timeout"));
}

#[tokio::test]
async fn retry_count_is_frozen_at_submission() {
    let page = form_page();
    let harness = Harness::new(page);
    let command = harness.seed_with_retries(JOB_URL, 2).await;

    let decision = harness.runner.run(&command).await.unwrap();
    assert!(matches!(decision, RunDecision::Completed));

    let application = harness.application(command.application_id).await;
    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert_eq!(application.retry_count, 2);
}

#[tokio::test]
async fn navigation_timeout_closes_browser_and_retries() {
    let page = form_page().with_navigate_timeout();
    let harness = Harness::new(page);
    let command = harness.seed_application(JOB_URL).await;

    let decision = harness.runner.run(&command).await.unwrap();
    match decision {
        RunDecision::Retry { kind, .. } => assert_eq!(kind.as_str(), "page_load_timeout"),
        other => panic!("expected retry, got {other:?}"),
    }
    assert_eq!(harness.provider.active_count(), 0);
}

#[tokio::test]
async fn settled_application_is_skipped_on_duplicate_delivery() {
    let harness = Harness::new(form_page());
    let command = harness.seed_application(JOB_URL).await;

    let first = harness.runner.run(&command).await.unwrap();
    assert!(matches!(first, RunDecision::Completed));

    // A second delivery of the same queue job must not run again.
    let second = harness.runner.run(&command).await.unwrap();
    assert!(matches!(second, RunDecision::Skipped));
    assert_eq!(harness.provider.acquire_count(), 1);
}

#[tokio::test]
async fn worker_pool_drains_queue_to_completion() {
    let harness = Harness::new(form_page());
    let command = harness.seed_application(JOB_URL).await;

    let queue = MemoryJobQueue::new();
    let enqueued = queue.enqueue(&command, JobPriority::Normal).await.unwrap();
    let job_id = enqueued.job().id;

    let runner = Arc::new(harness.runner);
    let shutdown = tokio_util::sync::CancellationToken::new();
    let pool = WorkerPool::new(
        Arc::new(queue.clone()),
        runner,
        WorkerPoolConfig {
            worker_count: 2,
            poll_interval: Duration::from_millis(20),
            ..WorkerPoolConfig::default()
        },
    );
    let pool_task = tokio::spawn(pool.run(shutdown.clone()));

    // Wait for the job to settle.
    for _ in 0..100 {
        if queue.job(job_id).unwrap().status == JobStatus::Succeeded {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.cancel();
    pool_task.await.unwrap().unwrap();

    assert_eq!(queue.job(job_id).unwrap().status, JobStatus::Succeeded);
    let application = harness.applications.find(command.application_id).await.unwrap().unwrap();
    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert_eq!(harness.provider.active_count(), 0);
}
