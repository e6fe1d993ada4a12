//! Wire payloads received on the inbound subjects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::subjects::Operation;

/// How a request authenticates against the management API.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A bearer token the caller already holds.
    Token(String),
    /// Exchanged for a token through the login endpoint.
    Password { email: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(..)"),
            Self::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Deserialize)]
struct RawInboundRequest {
    #[serde(alias = "requestId")]
    request_id: String,
    domain: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Fields common to every request: who is asking, for which tenant, and how
/// to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawInboundRequest")]
pub struct InboundRequest {
    pub request_id: String,
    pub domain: String,
    pub credentials: Credentials,
}

impl TryFrom<RawInboundRequest> for InboundRequest {
    type Error = ParseError;

    fn try_from(raw: RawInboundRequest) -> Result<Self, Self::Error> {
        if raw.request_id.is_empty() {
            return Err(ParseError::Invalid("request_id must not be empty"));
        }
        if raw.domain.is_empty() {
            return Err(ParseError::Invalid("domain must not be empty"));
        }
        let credentials = match (raw.token, raw.email, raw.password) {
            (Some(token), None, None) if !token.is_empty() => Credentials::Token(token),
            (None, Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Credentials::Password { email, password }
            }
            (None, None, None) => {
                return Err(ParseError::Invalid("either token or email/password is required"));
            }
            (Some(_), _, _) => {
                return Err(ParseError::Invalid(
                    "token must be non-empty and not combined with email/password",
                ));
            }
            (None, _, _) => {
                return Err(ParseError::Invalid("email and password must both be non-empty"));
            }
        };
        Ok(Self {
            request_id: raw.request_id,
            domain: raw.domain,
            credentials,
        })
    }
}

/// Identity attributes of a device. `mac` is required; anything else in the
/// object is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub mac: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreauthorizeRequest {
    #[serde(rename = "identity_data")]
    pub device_identity: DeviceIdentity,
    #[serde(rename = "pubkey")]
    pub public_key: String,
    #[serde(rename = "request_data")]
    pub base: InboundRequest,
}

/// Body sent to the device collection endpoint.
#[derive(Debug, Serialize)]
pub struct PreauthorizeBody<'a> {
    pub identity_data: &'a DeviceIdentity,
    pub pubkey: &'a str,
}

impl PreauthorizeRequest {
    pub fn body(&self) -> PreauthorizeBody<'_> {
        PreauthorizeBody {
            identity_data: &self.device_identity,
            pubkey: &self.public_key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn status(self) -> &'static str {
        match self {
            Self::Accept => "accepted",
            Self::Reject => "rejected",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthSetStatusBody {
    pub status: &'static str,
}

#[derive(Deserialize)]
struct RawAuthSetDecision {
    device_id: String,
    auth_set_id: String,
    request_data: InboundRequest,
}

/// Accept or reject one auth set. The decision comes from the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSetDecision {
    pub device_id: String,
    pub auth_set_id: String,
    pub base: InboundRequest,
    pub decision: Decision,
}

impl AuthSetDecision {
    pub fn body(&self) -> AuthSetStatusBody {
        AuthSetStatusBody {
            status: self.decision.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactUploadRequest {
    #[serde(rename = "container")]
    pub blob_container: String,
    pub blob_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "request_data")]
    pub base: InboundRequest,
}

/// A parsed inbound message, one variant per operation.
#[derive(Debug, Clone)]
pub enum Request {
    Login(InboundRequest),
    ListDevices(InboundRequest),
    Preauthorize(PreauthorizeRequest),
    AuthSet(AuthSetDecision),
    UploadArtifact(ArtifactUploadRequest),
}

impl Request {
    pub fn parse(operation: Operation, payload: &[u8]) -> Result<Self, ParseError> {
        let request = match operation {
            Operation::Login => {
                let base: InboundRequest = serde_json::from_slice(payload)?;
                if !matches!(base.credentials, Credentials::Password { .. }) {
                    return Err(ParseError::Invalid("login requires email and password"));
                }
                Self::Login(base)
            }
            Operation::ListDevices => Self::ListDevices(serde_json::from_slice(payload)?),
            Operation::PreauthorizeDevice => Self::Preauthorize(serde_json::from_slice(payload)?),
            Operation::AcceptDevice | Operation::RejectDevice => {
                let raw: RawAuthSetDecision = serde_json::from_slice(payload)?;
                if raw.device_id.is_empty() || raw.auth_set_id.is_empty() {
                    return Err(ParseError::Invalid("device_id and auth_set_id are required"));
                }
                if is_dot_segment(&raw.device_id) || is_dot_segment(&raw.auth_set_id) {
                    return Err(ParseError::Invalid(
                        "device_id and auth_set_id must not be `.` or `..`",
                    ));
                }
                let decision = if operation == Operation::AcceptDevice {
                    Decision::Accept
                } else {
                    Decision::Reject
                };
                Self::AuthSet(AuthSetDecision {
                    device_id: raw.device_id,
                    auth_set_id: raw.auth_set_id,
                    base: raw.request_data,
                    decision,
                })
            }
            Operation::UploadArtifact => {
                let upload: ArtifactUploadRequest = serde_json::from_slice(payload)?;
                if upload.blob_container.is_empty() || upload.blob_name.is_empty() {
                    return Err(ParseError::Invalid("container and blob_name are required"));
                }
                Self::UploadArtifact(upload)
            }
        };
        Ok(request)
    }

    pub fn base(&self) -> &InboundRequest {
        match self {
            Self::Login(base) | Self::ListDevices(base) => base,
            Self::Preauthorize(req) => &req.base,
            Self::AuthSet(req) => &req.base,
            Self::UploadArtifact(req) => &req.base,
        }
    }
}

/// Percent-encoding keeps dots, so these ids would still resolve as relative
/// path steps.
fn is_dot_segment(id: &str) -> bool {
    matches!(id, "." | "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(op: Operation, value: Value) -> Result<Request, ParseError> {
        Request::parse(op, value.to_string().as_bytes())
    }

    #[test]
    fn token_request_parses() {
        let req = parse(
            Operation::ListDevices,
            json!({"request_id": "req-42", "token": "abc", "domain": "x.example.com"}),
        )
        .unwrap();
        let base = req.base();
        assert_eq!(base.request_id, "req-42");
        assert_eq!(base.domain, "x.example.com");
        assert_eq!(base.credentials, Credentials::Token("abc".to_string()));
    }

    #[test]
    fn camel_case_request_id_is_accepted() {
        let req = parse(
            Operation::Login,
            json!({"requestId": "r1", "email": "a@b.c", "password": "pw", "domain": "d"}),
        )
        .unwrap();
        assert!(matches!(req, Request::Login(ref base) if base.request_id == "r1"));
    }

    #[test]
    fn exactly_one_auth_mode_is_required() {
        let cases = [
            json!({"request_id": "r", "domain": "d"}),
            json!({"request_id": "r", "domain": "d", "token": "t", "email": "e", "password": "p"}),
            json!({"request_id": "r", "domain": "d", "email": "e"}),
            json!({"request_id": "r", "domain": "d", "token": ""}),
        ];
        for case in cases {
            let err = parse(Operation::ListDevices, case.clone()).unwrap_err();
            assert!(matches!(err, ParseError::Json(_)), "{case}");
        }
    }

    #[test]
    fn empty_email_or_password_is_rejected() {
        let cases = [
            json!({"request_id": "r", "domain": "d", "email": "", "password": "p"}),
            json!({"request_id": "r", "domain": "d", "email": "e", "password": ""}),
            json!({"request_id": "r", "domain": "d", "email": "", "password": ""}),
        ];
        for case in cases {
            let err = parse(Operation::Login, case.clone()).unwrap_err();
            assert!(
                err.to_string().contains("email and password must both be non-empty"),
                "{case}: {err}"
            );
        }
    }

    #[test]
    fn empty_domain_is_rejected() {
        let err = parse(
            Operation::ListDevices,
            json!({"request_id": "r", "domain": "", "token": "t"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("domain must not be empty"));
    }

    #[test]
    fn login_requires_password_credentials() {
        let err = parse(
            Operation::Login,
            json!({"request_id": "r", "domain": "d", "token": "t"}),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Request::parse(Operation::ListDevices, b"{not json").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn preauthorize_body_has_only_identity_and_pubkey() {
        let req = parse(
            Operation::PreauthorizeDevice,
            json!({
                "identity_data": {"mac": "00:11:22:33:44:55", "sku": "rpi3"},
                "pubkey": "-----BEGIN PUBLIC KEY-----",
                "request_data": {"request_id": "p1", "domain": "d", "token": "t"}
            }),
        )
        .unwrap();
        let Request::Preauthorize(pre) = req else {
            panic!("expected preauthorize");
        };

        let body = serde_json::to_value(pre.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "identity_data": {"mac": "00:11:22:33:44:55", "sku": "rpi3"},
                "pubkey": "-----BEGIN PUBLIC KEY-----"
            })
        );
    }

    #[test]
    fn preauthorize_requires_mac() {
        let err = parse(
            Operation::PreauthorizeDevice,
            json!({
                "identity_data": {},
                "pubkey": "k",
                "request_data": {"request_id": "p1", "domain": "d", "token": "t"}
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("mac"));
    }

    #[test]
    fn decision_comes_from_subject() {
        let payload = json!({
            "device_id": "dev-1",
            "auth_set_id": "aset-1",
            "request_data": {"request_id": "a1", "domain": "d", "token": "t"}
        });

        let Request::AuthSet(accept) = parse(Operation::AcceptDevice, payload.clone()).unwrap()
        else {
            panic!("expected auth set decision");
        };
        let Request::AuthSet(reject) = parse(Operation::RejectDevice, payload).unwrap() else {
            panic!("expected auth set decision");
        };

        assert_eq!(
            serde_json::to_string(&accept.body()).unwrap(),
            r#"{"status":"accepted"}"#
        );
        assert_eq!(
            serde_json::to_string(&reject.body()).unwrap(),
            r#"{"status":"rejected"}"#
        );
    }

    #[test]
    fn dot_segment_ids_are_rejected() {
        for (device_id, auth_set_id) in [("..", "aset-1"), ("dev-1", "."), (".", "..")] {
            let payload = json!({
                "device_id": device_id,
                "auth_set_id": auth_set_id,
                "request_data": {"request_id": "a1", "domain": "d", "token": "t"}
            });
            let err = parse(Operation::AcceptDevice, payload).unwrap_err();
            assert!(
                matches!(err, ParseError::Invalid(msg) if msg.contains("must not be `.` or `..`")),
                "{device_id}/{auth_set_id}"
            );
        }
    }

    #[test]
    fn ids_with_url_delimiters_are_kept_verbatim() {
        let payload = json!({
            "device_id": "../../../v1/useradm/users/u1#",
            "auth_set_id": "aset?x=",
            "request_data": {"request_id": "a1", "domain": "d", "token": "t"}
        });
        let Request::AuthSet(decision) = parse(Operation::RejectDevice, payload).unwrap() else {
            panic!("expected auth set decision");
        };
        assert_eq!(decision.device_id, "../../../v1/useradm/users/u1#");
        assert_eq!(decision.auth_set_id, "aset?x=");
    }

    #[test]
    fn upload_request_defaults_description() {
        let Request::UploadArtifact(upload) = parse(
            Operation::UploadArtifact,
            json!({
                "container": "artifacts",
                "blob_name": "core-image.mender",
                "request_data": {"request_id": "u1", "domain": "d", "email": "e", "password": "p"}
            }),
        )
        .unwrap() else {
            panic!("expected upload");
        };
        assert_eq!(upload.blob_container, "artifacts");
        assert_eq!(upload.blob_name, "core-image.mender");
        assert_eq!(upload.description, "");
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let token = Credentials::Token("secret-token".into());
        let password = Credentials::Password {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{token:?}").contains("secret-token"));
        let rendered = format!("{password:?}");
        assert!(rendered.contains("ops@example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}
