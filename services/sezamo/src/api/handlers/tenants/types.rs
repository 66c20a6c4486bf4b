//! Request/response types for tenant endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SwitchTenantRequest {
    #[serde(rename = "tenantSlug")]
    pub tenant_slug: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TenantSummary {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SwitchTenantResponse {
    pub success: bool,
    pub tenant: TenantSummary,
    /// Creation time of the replacement session.
    pub timestamp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckModuleAccessRequest {
    pub module_slug: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckModuleAccessResponse {
    pub success: bool,
    #[serde(rename = "hasAccess")]
    pub has_access: bool,
}
