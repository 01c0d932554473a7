use crate::error::{RegistryError, Result};
use crate::tenant::TenantId;

/// Tenant database naming and routing logic
pub struct DatabaseRouter;

impl DatabaseRouter {
    pub fn new() -> Self {
        Self
    }

    /// Name prefix shared by every database of a platform
    pub fn platform_prefix(&self, platform: &str) -> String {
        format!("{}_", sanitize_identifier(platform))
    }

    /// Check if a database belongs to a platform
    pub fn belongs_to_platform(&self, db_name: &str, platform: &str) -> bool {
        db_name.starts_with(&self.platform_prefix(platform))
    }

    /// Extract the tenant from a database name. `{platform}_main` and
    /// databases of other platforms yield None; any other suffix, including
    /// one ending in `_main`, is a tenant.
    pub fn tenant_id_from_database(&self, db_name: &str, platform: &str) -> Option<TenantId> {
        let prefix = self.platform_prefix(platform);
        let suffix = db_name.strip_prefix(prefix.as_str())?;

        if suffix.is_empty() || suffix == "main" {
            None
        } else {
            Some(TenantId::from(suffix))
        }
    }

    /// Swap the database component of a base connection URL
    pub fn database_url_for(&self, base_url: &str, db_name: &str) -> Result<String> {
        match base_url.rfind('/') {
            Some(last_slash) if last_slash > base_url.find("://").map_or(0, |i| i + 2) => {
                let base = &base_url[..last_slash + 1];
                Ok(format!("{}{}", base, db_name))
            }
            _ => Err(RegistryError::Internal(format!(
                "Invalid DATABASE_URL format: {}",
                base_url
            ))),
        }
    }
}

impl Default for DatabaseRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitize identifier for PostgreSQL (lowercase, alphanumeric, underscore)
fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to_platform() {
        let router = DatabaseRouter::new();
        assert!(router.belongs_to_platform("myapp_main", "myapp"));
        assert!(router.belongs_to_platform("myapp_clinic_001", "myapp"));
        assert!(!router.belongs_to_platform("platformb_main", "myapp"));
    }

    #[test]
    fn test_tenant_id_from_database() {
        let router = DatabaseRouter::new();
        assert_eq!(
            router.tenant_id_from_database("myapp_clinic_001", "myapp"),
            Some(TenantId::from("clinic_001"))
        );
        assert_eq!(router.tenant_id_from_database("myapp_main", "myapp"), None);
        assert_eq!(
            router.tenant_id_from_database("myapp_sales_main", "myapp"),
            Some(TenantId::from("sales_main"))
        );
        assert_eq!(router.tenant_id_from_database("other_t1", "myapp"), None);
    }

    #[test]
    fn test_database_url_for() {
        let router = DatabaseRouter::new();
        assert_eq!(
            router
                .database_url_for("postgres://u:p@localhost:5432/postgres", "myapp_t1")
                .unwrap(),
            "postgres://u:p@localhost:5432/myapp_t1"
        );
        assert!(router.database_url_for("localhost", "myapp_t1").is_err());
        assert!(router.database_url_for("postgres://localhost", "x").is_err());
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("MyApp"), "myapp");
        assert_eq!(sanitize_identifier("clinic-001"), "clinic_001");
        assert_eq!(sanitize_identifier("test app"), "test_app");
        assert_eq!(sanitize_identifier("__test__"), "test");
    }
}
