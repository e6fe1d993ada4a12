//! Inbound subjects and their response prefixes.

/// The closed set of operations the gateway serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    ListDevices,
    PreauthorizeDevice,
    AcceptDevice,
    RejectDevice,
    UploadArtifact,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Self::Login,
        Self::ListDevices,
        Self::PreauthorizeDevice,
        Self::AcceptDevice,
        Self::RejectDevice,
        Self::UploadArtifact,
    ];

    /// Subject stem without the trailing token, e.g. `device.listDevice`.
    pub fn stem(self) -> &'static str {
        match self {
            Self::Login => "user.login",
            Self::ListDevices => "device.listDevice",
            Self::PreauthorizeDevice => "device.preauthorizeDevice",
            Self::AcceptDevice => "device.acceptDevice",
            Self::RejectDevice => "device.rejectDevice",
            Self::UploadArtifact => "device.uploadArtifact",
        }
    }

    pub fn response_prefix(self) -> &'static str {
        match self {
            Self::Login => "user.loginResponse.",
            Self::ListDevices => "device.listDeviceResponse.",
            Self::PreauthorizeDevice => "device.preauthorizeDeviceResponse.",
            Self::AcceptDevice => "device.acceptDeviceResponse.",
            Self::RejectDevice => "device.rejectDeviceResponse.",
            Self::UploadArtifact => "device.uploadArtifactResponse.",
        }
    }

    /// Wildcard filter a consumer subscribes with, e.g. `device.listDevice.>`.
    pub fn filter(self) -> String {
        format!("{}.>", self.stem())
    }

    /// `<prefix><request_id>`, with the request id used verbatim.
    pub fn response_subject(self, request_id: &str) -> String {
        format!("{}{}", self.response_prefix(), request_id)
    }

    /// Match a concrete inbound subject against the `<stem>.>` patterns.
    ///
    /// `device.listDeviceResponse.x` does not match `device.listDevice.>`
    /// because the stem must be followed by a dot and at least one more token.
    pub fn from_subject(subject: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| {
            subject
                .strip_prefix(op.stem())
                .and_then(|rest| rest.strip_prefix('.'))
                .is_some_and(|tail| !tail.is_empty())
        })
    }

    /// Name used in log fields.
    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ListDevices => "list_devices",
            Self::PreauthorizeDevice => "preauthorize_device",
            Self::AcceptDevice => "accept_device",
            Self::RejectDevice => "reject_device",
            Self::UploadArtifact => "upload_artifact",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Filter subjects for the durable consumer, one per operation.
pub fn consumer_filters() -> Vec<String> {
    Operation::ALL.into_iter().map(Operation::filter).collect()
}
