pub mod campaign;
pub mod campaign_update;
pub mod dispute;
pub mod milestone;
pub mod organization;
pub mod organization_service;
pub mod otp_code;
pub mod platform_settings;
pub mod pledge;
pub mod pledge_tier;
pub mod refund;
pub mod service_category;
pub mod stretch_goal;
pub mod user;
pub mod user_settings;
pub mod waitlist;
pub mod webhook_event;
