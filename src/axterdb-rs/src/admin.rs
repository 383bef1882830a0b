use crate::client::{expect_ok, read_json};
use crate::{Client, ClientError, Result};
use axterdb_core::{Envelope, KeyDetail};
use reqwest::StatusCode;

/// Key management for a connected session whose key is an admin key.
///
/// Obtained through [`Client::admin`]; borrows the session and its transport.
pub struct AdminClient<'a> {
    client: &'a Client,
}

impl<'a> AdminClient<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create a user and return its generated key
    #[tracing::instrument(parent = self.client.span(), skip(self))]
    pub async fn create_user(&self, name: &str, is_admin: bool) -> Result<String> {
        let http = self.client.transport()?;
        let admin = if is_admin { "1" } else { "0" };

        let response = self
            .client
            .authorized(http.post(self.client.route("/admin/keys/create")))
            .query(&[("name", name), ("admin", admin)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: Envelope<KeyDetail> = read_json(response).await?;
                Ok(body.detail.data.key)
            }
            status => Err(ClientError::UnknownError(status.as_u16())),
        }
    }

    /// Revoke a user's key
    #[tracing::instrument(parent = self.client.span(), skip_all)]
    pub async fn delete_user(&self, key: &str) -> Result<()> {
        let http = self.client.transport()?;

        let response = self
            .client
            .authorized(http.post(self.client.route("/admin/keys/delete")))
            .query(&[("key", key)])
            .send()
            .await?;

        expect_ok(response.status())
    }
}
