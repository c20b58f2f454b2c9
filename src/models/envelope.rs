use serde::{Deserialize, Serialize};

/// What the queue persists for every submission: the business payload plus
/// whatever auth material delivery needs, captured at enqueue time so a
/// background flush can authenticate without the foreground session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub body: P,
}

impl<P> Envelope<P> {
    pub fn new(body: P) -> Self {
        Self {
            auth_token: None,
            body,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}
