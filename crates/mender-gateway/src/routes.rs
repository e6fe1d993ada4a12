//! Management API paths.
//!
//! Built once at startup and handed to the dispatcher by reference; nothing
//! mutates it afterwards.

use std::borrow::Cow;
use std::collections::HashMap;

const PLACEHOLDER: char = '#';

/// Logical management API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    DeviceList,
    DeviceListCount,
    DeviceSearch,
    DeviceById,
    DeviceAuthSet,
    DeviceAuthSetStatus,
    TokenById,
    DeviceLimitByName,
    /// Multipart artifact upload; answers 201 on success.
    ArtifactUpload,
    /// Requests a pre-signed link for uploading an artifact out of band.
    ArtifactDirectUpload,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    templates: HashMap<Route, &'static str>,
}

impl RouteTable {
    /// Paths of the Mender management API (useradm v1, devauth v2, deployments v1).
    pub fn management() -> Self {
        let templates = HashMap::from([
            (Route::Login, "/api/management/v1/useradm/auth/login"),
            (Route::DeviceList, "/api/management/v2/devauth/devices"),
            (Route::DeviceListCount, "/api/management/v2/devauth/devices/count"),
            (Route::DeviceSearch, "/api/management/v2/devauth/devices/search"),
            (Route::DeviceById, "/api/management/v2/devauth/devices/#id"),
            (Route::DeviceAuthSet, "/api/management/v2/devauth/devices/#id/auth/#aid"),
            (
                Route::DeviceAuthSetStatus,
                "/api/management/v2/devauth/devices/#id/auth/#aid/status",
            ),
            (Route::TokenById, "/api/management/v2/devauth/tokens/#id"),
            (Route::DeviceLimitByName, "/api/management/v2/devauth/limits/#name"),
            (Route::ArtifactUpload, "/api/management/v1/deployments/artifacts"),
            (
                Route::ArtifactDirectUpload,
                "/api/management/v1/deployments/artifacts/directupload",
            ),
        ]);
        Self { templates }
    }

    pub fn template(&self, route: Route) -> &'static str {
        self.templates[&route]
    }

    /// Expand `route`, filling `#placeholder` segments from `params` in order.
    /// Each param is percent-encoded into a single path segment.
    ///
    /// # Panics
    ///
    /// If the number of params differs from the number of placeholders. Call
    /// sites pass a fixed arity, so a mismatch is a bug in the caller.
    pub fn path(&self, route: Route, params: &[&str]) -> String {
        let template = self.template(route);
        let mut params = params.iter();
        let path = template
            .split('/')
            .map(|segment| {
                if segment.starts_with(PLACEHOLDER) {
                    let param = params.next().unwrap_or_else(|| {
                        panic!("route {route:?}: no value for placeholder {segment}")
                    });
                    urlencoding::encode(param)
                } else {
                    Cow::Borrowed(segment)
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        assert!(
            params.next().is_none(),
            "route {route:?}: more params than placeholders in {template}"
        );
        path
    }

    /// `<scheme>://<domain><path>`
    pub fn url(&self, scheme: &str, domain: &str, route: Route, params: &[&str]) -> String {
        format!("{}://{}{}", scheme, domain, self.path(route, params))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::management()
    }
}
