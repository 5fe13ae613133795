//! AI-assisted campaign content built on the completion model and the source host.

use std::sync::Arc;

use db::models::{stretch_goal::StretchGoal, user::User};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    claude_api::{ClaudeApiError, CompletionModel, DEFAULT_MAX_TOKENS, ask_structured},
    github::{GitHubError, SourceHost, parse_repo_url, truncate_bytes},
    validation::{ValidationErrors, required_text},
};

const MAX_INPUT_BYTES: usize = 30_000;
const MAX_MILESTONES: usize = 8;
const MAX_TIERS: usize = 6;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("ai service error: {0}")]
    Ai(#[from] ClaudeApiError),
    #[error("repository error: {0}")]
    Source(#[from] GitHubError),
    #[error("repository has no README or docs to work from")]
    NoRepositoryContent,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContentKind {
    Description,
    Summary,
    Update,
}

impl ContentKind {
    fn guidance(self) -> &'static str {
        match self {
            ContentKind::Description => {
                "a full campaign description. Keep the structure, make the value to backers \
                 concrete and keep every technical claim the author made"
            }
            ContentKind::Summary => "a one or two sentence campaign summary under 280 characters",
            ContentKind::Update => "a progress update to backers. Keep it factual and specific",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct EnhanceContentRequest {
    pub content: String,
    pub kind: ContentKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct EnhancedContent {
    pub enhanced: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct DraftMilestone {
    pub name: String,
    pub description: String,
    /// Share of funds released when the milestone is accepted
    pub pct: i64,
    pub acceptance_criteria: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct DraftPledgeTier {
    pub title: String,
    pub description: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct CampaignDraft {
    pub title: String,
    pub summary: String,
    pub description: String,
    pub funding_goal_cents: i64,
    pub milestones: Vec<DraftMilestone>,
    #[serde(default)]
    pub pledge_tiers: Vec<DraftPledgeTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GenerateCampaignRequest {
    pub repo_url: String,
    pub access_token: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct Gap {
    pub title: String,
    pub severity: GapSeverity,
    pub description: String,
    pub suggested_milestone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct GapAnalysis {
    pub summary: String,
    pub gaps: Vec<Gap>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GapAnalysisRequest {
    pub scanner_output: String,
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, JsonSchema)]
pub struct StretchGoalSuggestion {
    pub title: String,
    pub description: String,
    pub target_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct StretchGoalSuggestions {
    suggestions: Vec<StretchGoalSuggestion>,
}

/// Rescale `weights` to whole percentages summing to 100, each at least 1.
/// Weights are clamped to 0..=100 first. Uses largest-remainder rounding;
/// all-zero weights split evenly.
pub fn normalize_pcts(weights: &[i64]) -> Vec<i64> {
    let n = weights.len() as i64;
    if n == 0 || n > 100 {
        return Vec::new();
    }
    let mut weights: Vec<i64> = weights.iter().map(|w| (*w).clamp(0, 100)).collect();
    let mut total: i64 = weights.iter().sum();
    if total == 0 {
        weights = vec![1; weights.len()];
        total = n;
    }

    let spare = 100 - n;
    let mut pcts: Vec<i64> = weights.iter().map(|w| 1 + spare * w / total).collect();
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(spare * weights[i] % total));

    let leftover = 100 - pcts.iter().sum::<i64>();
    for &i in order.iter().take(leftover as usize) {
        pcts[i] += 1;
    }
    pcts
}

pub struct ContentGenerator {
    pool: SqlitePool,
    model: Arc<dyn CompletionModel>,
    source: Arc<dyn SourceHost>,
}

impl ContentGenerator {
    pub fn new(
        pool: SqlitePool,
        model: Arc<dyn CompletionModel>,
        source: Arc<dyn SourceHost>,
    ) -> Self {
        Self {
            pool,
            model,
            source,
        }
    }

    pub async fn enhance_content(
        &self,
        request: &EnhanceContentRequest,
    ) -> Result<EnhancedContent, ContentError> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "content", &request.content, MAX_INPUT_BYTES);
        errors.into_result()?;

        let system = "You are an editor for a crowdfunding platform where makers fund \
                      production hardening of software prototypes. Improve clarity without \
                      inventing facts.";
        let prompt = format!(
            "Rewrite the following text as {}. List any claims you could not verify or \
             weakened in `notes`.\n\n---\n{}\n---",
            request.kind.guidance(),
            request.content.trim()
        );
        let result: EnhancedContent =
            ask_structured(self.model.as_ref(), &prompt, Some(system), DEFAULT_MAX_TOKENS).await?;
        if result.enhanced.trim().is_empty() {
            return Err(ClaudeApiError::InvalidOutput("empty enhanced content".to_string()).into());
        }
        Ok(result)
    }

    /// Draft a campaign from the repository's README and docs.
    pub async fn generate_campaign(
        &self,
        request: &GenerateCampaignRequest,
    ) -> Result<CampaignDraft, ContentError> {
        let repo = parse_repo_url(&request.repo_url)
            .map_err(|_| ValidationErrors::single("repo_url", "must be a GitHub repository URL"))?;
        let token = request.access_token.as_deref().filter(|t| !t.trim().is_empty());

        let readme = self.source.fetch_readme(&repo, token).await?;
        let docs = self.source.fetch_docs(&repo, token).await?;
        if readme.is_none() && docs.is_empty() {
            return Err(ContentError::NoRepositoryContent);
        }

        let mut context = String::new();
        if let Some(readme) = readme {
            context.push_str("## README\n\n");
            context.push_str(&readme);
            context.push_str("\n\n");
        }
        for doc in &docs {
            context.push_str(&format!("## {}\n\n{}\n\n", doc.path, doc.content));
        }
        let context = truncate_bytes(context, MAX_INPUT_BYTES);

        let system = "You plan crowdfunding campaigns that turn working prototypes into \
                      production software. Milestones are concrete, independently verifiable \
                      deliverables.";
        let prompt = format!(
            "Draft a campaign for the repository {repo}. Propose 3 to 6 milestones whose `pct` \
             values are the share of funds released on acceptance and sum to 100, and 2 to 4 \
             pledge tiers. Amounts are in US cents.\n\n{context}"
        );
        let mut draft: CampaignDraft =
            ask_structured(self.model.as_ref(), &prompt, Some(system), DEFAULT_MAX_TOKENS).await?;

        if draft.title.trim().is_empty() || draft.milestones.is_empty() {
            return Err(ClaudeApiError::InvalidOutput(
                "draft is missing a title or milestones".to_string(),
            )
            .into());
        }
        draft.milestones.truncate(MAX_MILESTONES);
        let pcts = normalize_pcts(&draft.milestones.iter().map(|m| m.pct).collect::<Vec<_>>());
        for (milestone, pct) in draft.milestones.iter_mut().zip(pcts) {
            milestone.pct = pct;
        }
        draft.pledge_tiers.retain(|t| t.amount_cents > 0);
        draft.pledge_tiers.truncate(MAX_TIERS);
        if draft.funding_goal_cents <= 0 {
            return Err(ClaudeApiError::InvalidOutput("non-positive funding goal".to_string()).into());
        }

        info!(repo = %repo, milestones = draft.milestones.len(), "Generated campaign draft");
        Ok(draft)
    }

    pub async fn gap_analysis(&self, request: &GapAnalysisRequest) -> Result<GapAnalysis, ContentError> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "scanner_output", &request.scanner_output, usize::MAX);
        errors.into_result()?;

        let scanner_output = truncate_bytes(request.scanner_output.clone(), MAX_INPUT_BYTES);
        let repo_line = match &request.repo_url {
            Some(url) => format!("Repository: {url}\n\n"),
            None => String::new(),
        };
        let system = "You are a security and reliability reviewer. Group scanner findings into \
                      gaps a maker could fund as milestones.";
        let prompt = format!(
            "{repo_line}Summarize the production-readiness gaps in the scanner output below. \
             Rate each gap low, medium, high or critical and suggest the milestone that would \
             close it.\n\n```\n{scanner_output}\n```"
        );
        Ok(ask_structured(self.model.as_ref(), &prompt, Some(system), DEFAULT_MAX_TOKENS).await?)
    }

    /// Suggestions priced at or below the funding goal are dropped.
    pub async fn suggest_stretch_goals(
        &self,
        user: &User,
        campaign_id: Uuid,
    ) -> Result<Vec<StretchGoalSuggestion>, ContentError> {
        let campaign = access::campaign_for_edit(&self.pool, campaign_id, user).await?;
        let existing = StretchGoal::find_by_campaign(&self.pool, campaign_id).await?;

        let mut prompt = format!(
            "Campaign: {}\nSummary: {}\nFunding goal: {} cents\n",
            campaign.title,
            campaign.summary.as_deref().unwrap_or(""),
            campaign.funding_goal_cents
        );
        if let Some(description) = &campaign.description {
            prompt.push_str(&format!(
                "\nDescription:\n{}\n",
                truncate_bytes(description.clone(), MAX_INPUT_BYTES)
            ));
        }
        if !existing.is_empty() {
            prompt.push_str("\nExisting stretch goals:\n");
            for goal in &existing {
                prompt.push_str(&format!("- {} ({} cents)\n", goal.title, goal.target_cents));
            }
        }
        prompt.push_str(
            "\nSuggest 3 new stretch goals. Each target_cents must be above the funding goal \
             and the goals should build on each other.",
        );

        let response: StretchGoalSuggestions =
            ask_structured(self.model.as_ref(), &prompt, None, DEFAULT_MAX_TOKENS).await?;
        let goal = campaign.funding_goal_cents;
        Ok(response
            .suggestions
            .into_iter()
            .filter(|s| s.target_cents > goal && !s.title.trim().is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::services::{
        github::{RepoDocument, RepoRef},
        test_support::{self, CannedModel},
    };

    struct FakeSource {
        readme: Option<String>,
    }

    #[async_trait]
    impl SourceHost for FakeSource {
        async fn fetch_readme(
            &self,
            _repo: &RepoRef,
            _token: Option<&str>,
        ) -> Result<Option<String>, GitHubError> {
            Ok(self.readme.clone())
        }

        async fn fetch_docs(
            &self,
            _repo: &RepoRef,
            _token: Option<&str>,
        ) -> Result<Vec<RepoDocument>, GitHubError> {
            Ok(Vec::new())
        }
    }

    fn generator(db: &db::DBService, reply: &str, readme: Option<&str>) -> (ContentGenerator, Arc<CannedModel>) {
        let model = Arc::new(CannedModel::new(reply));
        let source = Arc::new(FakeSource {
            readme: readme.map(str::to_string),
        });
        (ContentGenerator::new(db.pool.clone(), model.clone(), source), model)
    }

    #[test]
    fn normalizes_percentages() {
        assert_eq!(normalize_pcts(&[50, 30, 20]), vec![50, 30, 20]);
        assert_eq!(normalize_pcts(&[1, 1, 1]), vec![34, 33, 33]);
        assert_eq!(normalize_pcts(&[0, 0]), vec![50, 50]);
        let skewed = normalize_pcts(&[1000, 0, 0]);
        assert_eq!(skewed.iter().sum::<i64>(), 100);
        assert!(skewed.iter().all(|p| *p >= 1));
        assert!(normalize_pcts(&[]).is_empty());
    }

    #[test]
    fn extreme_weights_do_not_overflow() {
        assert_eq!(normalize_pcts(&[i64::MAX, 1]), vec![98, 2]);
        assert_eq!(normalize_pcts(&[i64::MAX, i64::MAX, i64::MIN]), vec![50, 49, 1]);
    }

    #[tokio::test]
    async fn generated_draft_is_normalized() {
        let db = test_support::db().await;
        let reply = r#"```json
{"title":"Ship it","summary":"Hardening","description":"Long form","funding_goal_cents":500000,
 "milestones":[
   {"name":"Tests","description":"","pct":40,"acceptance_criteria":"CI green"},
   {"name":"Auth","description":"","pct":40,"acceptance_criteria":"SSO"},
   {"name":"Docs","description":"","pct":40,"acceptance_criteria":"Published"}],
 "pledge_tiers":[{"title":"Backer","description":"","amount_cents":2500},
                 {"title":"Broken","description":"","amount_cents":0}]}
```"#;
        let (generator, model) = generator(&db, reply, Some("# Prototype\nA CLI tool."));

        let draft = generator
            .generate_campaign(&GenerateCampaignRequest {
                repo_url: "https://github.com/acme/proto".to_string(),
                access_token: None,
            })
            .await
            .unwrap();

        assert_eq!(draft.milestones.iter().map(|m| m.pct).sum::<i64>(), 100);
        assert_eq!(draft.pledge_tiers.len(), 1);
        assert!(model.prompts.lock().unwrap()[0].contains("A CLI tool."));
    }

    #[tokio::test]
    async fn generation_needs_repository_content() {
        let db = test_support::db().await;
        let (generator, _) = generator(&db, "{}", None);

        assert!(matches!(
            generator
                .generate_campaign(&GenerateCampaignRequest {
                    repo_url: "https://github.com/acme/empty".to_string(),
                    access_token: None,
                })
                .await,
            Err(ContentError::NoRepositoryContent)
        ));
        assert!(matches!(
            generator
                .generate_campaign(&GenerateCampaignRequest {
                    repo_url: "https://gitlab.com/acme/proto".to_string(),
                    access_token: None,
                })
                .await,
            Err(ContentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn invalid_model_output_is_an_ai_error() {
        let db = test_support::db().await;
        let (generator, _) = generator(&db, "I cannot help with that.", None);

        let err = generator
            .enhance_content(&EnhanceContentRequest {
                content: "We make the thing better".to_string(),
                kind: ContentKind::Summary,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Ai(ClaudeApiError::InvalidOutput(_))));
    }

    #[tokio::test]
    async fn gap_analysis_parses_severities() {
        let db = test_support::db().await;
        let reply = r#"{"summary":"Two issues","gaps":[
            {"title":"No rate limiting","severity":"high","description":"Login endpoint","suggested_milestone":"Add limits"},
            {"title":"Outdated deps","severity":"low","description":"3 minor","suggested_milestone":"Update"}]}"#;
        let (generator, _) = generator(&db, reply, None);

        let analysis = generator
            .gap_analysis(&GapAnalysisRequest {
                scanner_output: "semgrep: 2 findings".to_string(),
                repo_url: None,
            })
            .await
            .unwrap();
        assert_eq!(analysis.gaps.len(), 2);
        assert_eq!(analysis.gaps[0].severity, GapSeverity::High);
    }

    #[tokio::test]
    async fn stretch_suggestions_above_goal_only() {
        let db = test_support::db().await;
        let maker = test_support::user(&db, "maker@example.com").await;
        let stranger = test_support::user(&db, "stranger@example.com").await;
        let campaign = test_support::draft_campaign(&db, &maker, 100_000).await;
        let reply = r#"{"suggestions":[
            {"title":"Mobile app","description":"","target_cents":150000},
            {"title":"Too small","description":"","target_cents":100000},
            {"title":"Plugins","description":"","target_cents":250000}]}"#;
        let (generator, _) = generator(&db, reply, None);

        let suggestions = generator.suggest_stretch_goals(&maker, campaign.id).await.unwrap();
        let titles: Vec<_> = suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Mobile app", "Plugins"]);

        assert!(matches!(
            generator.suggest_stretch_goals(&stranger, campaign.id).await,
            Err(ContentError::Access(AccessError::Forbidden(_)))
        ));
    }
}
