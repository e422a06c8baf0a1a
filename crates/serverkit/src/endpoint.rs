//! REST endpoints for each kind of construct

use reconcile::Construct;

/// Path and query parameters addressing one construct's membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Endpoint {
    pub fn for_construct(construct: &Construct) -> Self {
        match construct {
            Construct::Permission { group } => Self {
                path: "/api/permissions/members",
                params: vec![("group", group.clone())],
            },
            Construct::License { license } => Self {
                path: "/api/licenses/assignees",
                params: vec![("license", license.clone())],
            },
            Construct::Administrators { area } => Self {
                path: "/api/areas/administrators",
                params: vec![("area", area.to_string())],
            },
            Construct::Members { area } => Self {
                path: "/api/areas/members",
                params: vec![("area", area.to_string())],
            },
            Construct::Role { area, role } => Self {
                path: "/api/areas/roles/members",
                params: vec![("area", area.to_string()), ("role", role.clone())],
            },
        }
    }

    /// Full URL under `base` (trailing slashes on `base` are ignored)
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path)
    }
}

/// Session endpoint, relative to the server URL
pub const SESSION_PATH: &str = "/api/session";

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::AreaPath;

    #[test]
    fn test_role_endpoint() {
        let construct = Construct::role(AreaPath::parse("Payments/Backend"), "Tester");
        let endpoint = Endpoint::for_construct(&construct);

        assert_eq!(
            endpoint.url("https://rtc.example.com:9443/ccm/"),
            "https://rtc.example.com:9443/ccm/api/areas/roles/members"
        );
        assert_eq!(
            endpoint.params,
            vec![
                ("area", "Payments/Backend".to_string()),
                ("role", "Tester".to_string())
            ]
        );
    }

    #[test]
    fn test_permission_endpoint() {
        let endpoint = Endpoint::for_construct(&Construct::permission("JazzAdmins"));
        assert_eq!(endpoint.path, "/api/permissions/members");
        assert_eq!(endpoint.params, vec![("group", "JazzAdmins".to_string())]);
    }
}
