//! Writes the TypeScript declarations of the API types to `shared/types.ts`.

use std::{env, fs, path::PathBuf};

use ts_rs::TS;

fn generate_types_content() -> String {
    let decls = [
        utils::response::ApiResponse::<(), ()>::decl(),
        services::services::validation::ValidationErrors::decl(),
        db::models::user::UserRole::decl(),
        db::models::user::User::decl(),
        db::models::user_settings::UserSettings::decl(),
        db::models::user_settings::UpdateUserSettings::decl(),
        db::models::platform_settings::PlatformSettings::decl(),
        db::models::platform_settings::UpdatePlatformSettings::decl(),
        db::models::waitlist::WaitlistStatus::decl(),
        db::models::waitlist::WaitlistEntry::decl(),
        db::models::waitlist::CreateWaitlistEntry::decl(),
        db::models::organization::OrganizationKind::decl(),
        db::models::organization::OrganizationStatus::decl(),
        db::models::organization::Organization::decl(),
        db::models::organization::CreateOrganization::decl(),
        db::models::organization::UpdateOrganization::decl(),
        db::models::service_category::ServiceCategory::decl(),
        db::models::service_category::CreateServiceCategory::decl(),
        db::models::service_category::UpdateServiceCategory::decl(),
        db::models::organization_service::OrganizationService::decl(),
        db::models::organization_service::CreateOrganizationService::decl(),
        db::models::organization_service::UpdateOrganizationService::decl(),
        db::models::organization_service::MarketplaceListing::decl(),
        db::models::campaign::CampaignStatus::decl(),
        db::models::campaign::Campaign::decl(),
        db::models::campaign::CampaignWithFunding::decl(),
        db::models::campaign::CreateCampaign::decl(),
        db::models::campaign::UpdateCampaign::decl(),
        db::models::campaign::CampaignStatusCount::decl(),
        db::models::campaign_update::CampaignUpdate::decl(),
        db::models::campaign_update::CreateCampaignUpdate::decl(),
        db::models::milestone::MilestoneStatus::decl(),
        db::models::milestone::Milestone::decl(),
        db::models::milestone::CreateMilestone::decl(),
        db::models::milestone::UpdateMilestone::decl(),
        db::models::pledge_tier::PledgeTier::decl(),
        db::models::pledge_tier::CreatePledgeTier::decl(),
        db::models::pledge_tier::UpdatePledgeTier::decl(),
        db::models::stretch_goal::StretchGoal::decl(),
        db::models::stretch_goal::StretchGoalProgress::decl(),
        db::models::stretch_goal::CreateStretchGoal::decl(),
        db::models::stretch_goal::UpdateStretchGoal::decl(),
        db::models::pledge::PledgeStatus::decl(),
        db::models::pledge::Pledge::decl(),
        db::models::pledge::BackerPledge::decl(),
        db::models::refund::RefundStatus::decl(),
        db::models::refund::Refund::decl(),
        db::models::dispute::DisputeStatus::decl(),
        db::models::dispute::Dispute::decl(),
        services::services::campaigns::CampaignAction::decl(),
        services::services::campaigns::FundingSummary::decl(),
        services::services::campaigns::CampaignDetail::decl(),
        services::services::milestones::SubmitMilestone::decl(),
        services::services::milestones::RejectMilestone::decl(),
        services::services::checkout::StartCheckout::decl(),
        services::services::checkout::CheckoutStarted::decl(),
        services::services::refunds::CreateRefund::decl(),
        services::services::marketplace::ReviewOrganization::decl(),
        services::services::admin::PlatformStats::decl(),
        services::services::admin::UserPage::decl(),
        services::services::admin::SetRole::decl(),
        services::services::content_generator::ContentKind::decl(),
        services::services::content_generator::EnhanceContentRequest::decl(),
        services::services::content_generator::EnhancedContent::decl(),
        services::services::content_generator::GenerateCampaignRequest::decl(),
        services::services::content_generator::CampaignDraft::decl(),
        services::services::content_generator::DraftMilestone::decl(),
        services::services::content_generator::DraftPledgeTier::decl(),
        services::services::content_generator::GapAnalysisRequest::decl(),
        services::services::content_generator::GapSeverity::decl(),
        services::services::content_generator::Gap::decl(),
        services::services::content_generator::GapAnalysis::decl(),
        services::services::content_generator::StretchGoalSuggestion::decl(),
        server::routes::auth::RequestCode::decl(),
        server::routes::auth::VerifyCode::decl(),
        server::routes::users::UpdateProfile::decl(),
        server::routes::campaigns::TransitionCampaign::decl(),
        server::routes::campaigns::AddTeamMember::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|decl| format!("export {decl}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "// This file was generated by `cargo run --bin generate-types`. Do not edit it by hand.\n\n{body}\n"
    )
}

fn main() {
    let check = env::args().any(|arg| arg == "--check");
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared/types.ts");
    let content = generate_types_content();

    if check {
        match fs::read_to_string(&path) {
            Ok(current) if current == content => println!("✅ shared/types.ts is up to date."),
            _ => {
                eprintln!("❌ shared/types.ts is out of date. Run `cargo run --bin generate-types`.");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Failed to create {}: {}", parent.display(), e);
            std::process::exit(1);
        }
    }
    if let Err(e) = fs::write(&path, content) {
        eprintln!("Failed to write {}: {}", path.display(), e);
        std::process::exit(1);
    }
    println!("✅ TypeScript types written to {}", path.display());
}
