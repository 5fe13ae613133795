pub mod access;
pub mod admin;
pub mod auth;
pub mod campaigns;
pub mod checkout;
pub mod claude_api;
pub mod config;
pub mod content_generator;
pub mod email;
pub mod email_templates;
pub mod github;
pub mod marketplace;
pub mod milestone_review;
pub mod milestones;
pub mod payments;
pub mod refunds;
pub mod rewards;
pub mod stripe_webhook;
pub mod validation;
pub mod waitlist;

#[cfg(test)]
pub(crate) mod test_support;
