//! Organizations, their marketplace listings and the category catalog.

use db::models::{
    organization::{
        CreateOrganization, Organization, OrganizationKind, OrganizationStatus, UpdateOrganization,
    },
    organization_service::{
        CreateOrganizationService, MarketplaceListing, OrganizationService, UpdateOrganizationService,
    },
    service_category::{CreateServiceCategory, ServiceCategory, UpdateServiceCategory},
    user::User,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use utils::text::slugify;
use uuid::Uuid;

use super::{
    access::{self, AccessError},
    validation::{ValidationErrors, required_text},
};

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("a category named like this already exists")]
    DuplicateCategory,
    #[error("category still has {0} listings")]
    CategoryInUse(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ReviewOrganization {
    pub approved: bool,
    pub reason: Option<String>,
}

fn check_price(errors: &mut ValidationErrors, price_cents: Option<i64>) {
    if let Some(price) = price_cents {
        errors.check(price >= 0, "price_cents", "must not be negative");
    }
}

fn check_website(errors: &mut ValidationErrors, website: Option<&str>) {
    if let Some(website) = website.map(str::trim).filter(|w| !w.is_empty()) {
        let ok = url::Url::parse(website).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
        errors.check(ok, "website", "must be an http(s) URL");
    }
}

pub struct MarketplaceService {
    pool: SqlitePool,
}

impl MarketplaceService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Organizations

    pub async fn create_organization(
        &self,
        user: &User,
        data: &CreateOrganization,
    ) -> Result<Organization, MarketplaceError> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "name", &data.name, 200);
        check_website(&mut errors, data.website.as_deref());
        errors.into_result()?;

        let mut data = data.clone();
        data.name = data.name.trim().to_string();
        let organization = Organization::create(&self.pool, Uuid::new_v4(), user.id, &data).await?;
        info!(organization_id = %organization.id, owner_id = %user.id, kind = %organization.kind, "Organization created");
        Ok(organization)
    }

    /// Approved organizations are public. Others read as missing except to the owner and admins.
    pub async fn get_organization(
        &self,
        id: Uuid,
        viewer: Option<&User>,
    ) -> Result<Organization, MarketplaceError> {
        let organization = Organization::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccessError::NotFound("organization"))?;
        let privileged = viewer.is_some_and(|u| u.is_admin() || u.id == organization.owner_id);
        if organization.is_approved() || privileged {
            Ok(organization)
        } else {
            Err(AccessError::NotFound("organization").into())
        }
    }

    async fn owned_organization(&self, user: &User, id: Uuid) -> Result<Organization, MarketplaceError> {
        let organization = Organization::find_by_id(&self.pool, id)
            .await?
            .ok_or(AccessError::NotFound("organization"))?;
        if organization.owner_id != user.id {
            return Err(AccessError::Forbidden("not the owner of this organization").into());
        }
        Ok(organization)
    }

    pub async fn update_organization(
        &self,
        user: &User,
        id: Uuid,
        data: &UpdateOrganization,
    ) -> Result<Organization, MarketplaceError> {
        self.owned_organization(user, id).await?;
        let mut errors = ValidationErrors::new();
        if let Some(name) = &data.name {
            required_text(&mut errors, "name", name, 200);
        }
        check_website(&mut errors, data.website.as_deref());
        errors.into_result()?;

        Organization::update(&self.pool, id, data)
            .await?
            .ok_or_else(|| AccessError::NotFound("organization").into())
    }

    pub async fn my_organizations(&self, user: &User) -> Result<Vec<Organization>, MarketplaceError> {
        Ok(Organization::find_by_owner(&self.pool, user.id).await?)
    }

    pub async fn list_organizations(
        &self,
        admin: &User,
        status: Option<OrganizationStatus>,
    ) -> Result<Vec<Organization>, MarketplaceError> {
        access::require_admin(admin)?;
        Ok(Organization::list(&self.pool, status).await?)
    }

    pub async fn review_organization(
        &self,
        admin: &User,
        id: Uuid,
        data: &ReviewOrganization,
    ) -> Result<Organization, MarketplaceError> {
        access::require_admin(admin)?;
        let (status, reason) = if data.approved {
            (OrganizationStatus::Approved, None)
        } else {
            let reason = data.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
            if reason.is_none() {
                return Err(ValidationErrors::single("reason", "is required when rejecting").into());
            }
            (OrganizationStatus::Rejected, reason)
        };

        let organization = Organization::set_status(&self.pool, id, status, reason)
            .await?
            .ok_or(AccessError::NotFound("organization"))?;
        info!(organization_id = %id, status = %status, admin_id = %admin.id, "Organization reviewed");
        Ok(organization)
    }

    // Listings

    pub async fn list_services(
        &self,
        organization_id: Uuid,
        viewer: Option<&User>,
    ) -> Result<Vec<OrganizationService>, MarketplaceError> {
        let organization = self.get_organization(organization_id, viewer).await?;
        let owner_view = viewer.is_some_and(|u| u.id == organization.owner_id || u.is_admin());
        let services = OrganizationService::find_by_organization(&self.pool, organization_id).await?;
        Ok(services
            .into_iter()
            .filter(|s| owner_view || s.is_active)
            .collect())
    }

    async fn check_category(&self, errors: &mut ValidationErrors, category_id: Uuid) -> Result<(), MarketplaceError> {
        let active = ServiceCategory::find_by_id(&self.pool, category_id)
            .await?
            .is_some_and(|c| c.is_active);
        errors.check(active, "category_id", "is not an active category");
        Ok(())
    }

    pub async fn create_service(
        &self,
        user: &User,
        organization_id: Uuid,
        data: &CreateOrganizationService,
    ) -> Result<OrganizationService, MarketplaceError> {
        let organization = self.owned_organization(user, organization_id).await?;

        let mut errors = ValidationErrors::new();
        errors.check(
            organization.kind == OrganizationKind::ServiceProvider,
            "organization",
            "only service providers can list services",
        );
        errors.check(
            organization.is_approved(),
            "organization",
            "organization must be approved first",
        );
        required_text(&mut errors, "title", &data.title, 200);
        check_price(&mut errors, data.price_cents);
        self.check_category(&mut errors, data.category_id).await?;
        errors.into_result()?;

        let service = OrganizationService::create(&self.pool, Uuid::new_v4(), organization_id, data).await?;
        info!(organization_id = %organization_id, service_id = %service.id, "Service listed");
        Ok(service)
    }

    async fn owned_service(
        &self,
        user: &User,
        organization_id: Uuid,
        service_id: Uuid,
    ) -> Result<OrganizationService, MarketplaceError> {
        self.owned_organization(user, organization_id).await?;
        OrganizationService::find_by_id(&self.pool, service_id)
            .await?
            .filter(|s| s.organization_id == organization_id)
            .ok_or_else(|| AccessError::NotFound("service").into())
    }

    pub async fn update_service(
        &self,
        user: &User,
        organization_id: Uuid,
        service_id: Uuid,
        data: &UpdateOrganizationService,
    ) -> Result<OrganizationService, MarketplaceError> {
        self.owned_service(user, organization_id, service_id).await?;

        let mut errors = ValidationErrors::new();
        if let Some(title) = &data.title {
            required_text(&mut errors, "title", title, 200);
        }
        check_price(&mut errors, data.price_cents);
        if let Some(category_id) = data.category_id {
            self.check_category(&mut errors, category_id).await?;
        }
        errors.into_result()?;

        OrganizationService::update(&self.pool, service_id, data)
            .await?
            .ok_or_else(|| AccessError::NotFound("service").into())
    }

    pub async fn delete_service(
        &self,
        user: &User,
        organization_id: Uuid,
        service_id: Uuid,
    ) -> Result<(), MarketplaceError> {
        self.owned_service(user, organization_id, service_id).await?;
        OrganizationService::delete(&self.pool, service_id).await?;
        Ok(())
    }

    /// Public listings, optionally limited to one category slug. An unknown slug yields nothing.
    pub async fn marketplace(
        &self,
        category_slug: Option<&str>,
    ) -> Result<Vec<MarketplaceListing>, MarketplaceError> {
        let category_id = match category_slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => match ServiceCategory::find_by_slug(&self.pool, slug).await? {
                Some(category) => Some(category.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };
        Ok(OrganizationService::list_marketplace(&self.pool, category_id).await?)
    }

    // Categories

    pub async fn list_categories(&self, include_inactive: bool) -> Result<Vec<ServiceCategory>, MarketplaceError> {
        Ok(ServiceCategory::list(&self.pool, !include_inactive).await?)
    }

    pub async fn create_category(
        &self,
        admin: &User,
        data: &CreateServiceCategory,
    ) -> Result<ServiceCategory, MarketplaceError> {
        access::require_admin(admin)?;
        let slug = category_slug(&data.name)?;

        if ServiceCategory::find_by_slug(&self.pool, &slug).await?.is_some() {
            return Err(MarketplaceError::DuplicateCategory);
        }
        match ServiceCategory::create(
            &self.pool,
            Uuid::new_v4(),
            data.name.trim(),
            &slug,
            data.description.as_deref(),
        )
        .await
        {
            Ok(category) => Ok(category),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(MarketplaceError::DuplicateCategory)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_category(
        &self,
        admin: &User,
        id: Uuid,
        data: &UpdateServiceCategory,
    ) -> Result<ServiceCategory, MarketplaceError> {
        access::require_admin(admin)?;
        let mut slug = None;
        if let Some(name) = &data.name {
            let new_slug = category_slug(name)?;
            if let Some(existing) = ServiceCategory::find_by_slug(&self.pool, &new_slug).await? {
                if existing.id != id {
                    return Err(MarketplaceError::DuplicateCategory);
                }
            }
            slug = Some(new_slug);
        }

        match ServiceCategory::update(&self.pool, id, data, slug.as_deref()).await {
            Ok(Some(category)) => Ok(category),
            Ok(None) => Err(AccessError::NotFound("category").into()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(MarketplaceError::DuplicateCategory)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_category(&self, admin: &User, id: Uuid) -> Result<(), MarketplaceError> {
        access::require_admin(admin)?;
        let listings = ServiceCategory::listing_count(&self.pool, id).await?;
        if listings > 0 {
            return Err(MarketplaceError::CategoryInUse(listings));
        }
        if ServiceCategory::delete(&self.pool, id).await? == 0 {
            return Err(AccessError::NotFound("category").into());
        }
        Ok(())
    }
}

/// Names must leave a non-empty slug, which is what keeps categories unique.
fn category_slug(name: &str) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    required_text(&mut errors, "name", name, 100);
    let slug = slugify(name);
    if errors.is_empty() {
        errors.check(!slug.is_empty(), "name", "must contain letters or digits");
    }
    errors.into_result()?;
    Ok(slug)
}
