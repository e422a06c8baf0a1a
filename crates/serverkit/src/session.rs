//! HTTP sessions against a server's administration API

use log::{debug, info};
use reconcile::{
    Construct, Identity, MemberSet, ServerConfig, ServerConnector, ServerSession,
    ServerStateReader, ServerStateWriter,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::endpoint::{Endpoint, SESSION_PATH};
use crate::error::{Error, Result};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Opens authenticated [`HttpSession`]s
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        ureq::Agent::new_with_config(config)
    }

    /// Log in and open a session; `password` must already be resolved
    pub fn login(&self, server: &ServerConfig) -> Result<HttpSession> {
        let user = server
            .user
            .as_deref()
            .ok_or_else(|| Error::MissingCredentials(server.label().to_string()))?;
        let password = server.password.as_deref().unwrap_or_default();
        let agent = self.agent();
        let url = format!("{}{}", server.url.trim_end_matches('/'), SESSION_PATH);

        debug!("Logging in to {} as {}", server.url, user);
        let response: LoginResponse = agent
            .post(&url)
            .header("Accept", "application/json")
            .send_json(&LoginRequest { user, password })?
            .body_mut()
            .read_json()?;
        info!("Connected to {} as {}", server.label(), user);

        Ok(HttpSession {
            agent,
            base_url: server.url.trim_end_matches('/').to_string(),
            token: response.token,
        })
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ServerConnector for HttpConnector {
    fn connect(&self, server: &ServerConfig) -> anyhow::Result<Box<dyn ServerSession>> {
        let session = self
            .login(server)
            .map_err(|e| e.into_connection(server.label()))?;
        Ok(Box::new(session))
    }
}

/// An authenticated session; every request carries the bearer token
pub struct HttpSession {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl HttpSession {
    fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Current holders of a construct
    pub fn members(&self, construct: &Construct) -> Result<MemberSet> {
        let endpoint = Endpoint::for_construct(construct);
        let mut request = self
            .agent
            .get(&endpoint.url(&self.base_url))
            .header("Authorization", &self.authorization())
            .header("Accept", "application/json");
        for (key, value) in &endpoint.params {
            request = request.query(*key, value);
        }

        let ids: Vec<Identity> = request.call()?.body_mut().read_json()?;
        Ok(ids.into_iter().collect())
    }

    /// Add `identity` to a construct; already holding it is fine
    pub fn add(&self, construct: &Construct, identity: &Identity) -> Result<()> {
        let endpoint = Endpoint::for_construct(construct);
        let mut request = self
            .agent
            .put(&endpoint.url(&self.base_url))
            .header("Authorization", &self.authorization());
        for (key, value) in &endpoint.params {
            request = request.query(*key, value);
        }

        match request.query("user", identity.as_str()).send_empty() {
            Ok(_) | Err(ureq::Error::StatusCode(409)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `identity` from a construct; not holding it is fine
    pub fn remove(&self, construct: &Construct, identity: &Identity) -> Result<()> {
        let endpoint = Endpoint::for_construct(construct);
        let mut request = self
            .agent
            .delete(&endpoint.url(&self.base_url))
            .header("Authorization", &self.authorization());
        for (key, value) in &endpoint.params {
            request = request.query(*key, value);
        }

        match request.query("user", identity.as_str()).call() {
            Ok(_) | Err(ureq::Error::StatusCode(404)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// End the session on the server
    pub fn logout(&self) -> Result<()> {
        self.agent
            .delete(&format!("{}{}", self.base_url, SESSION_PATH))
            .header("Authorization", &self.authorization())
            .call()?;
        Ok(())
    }
}

impl ServerStateReader for HttpSession {
    fn current_members(&mut self, construct: &Construct) -> anyhow::Result<MemberSet> {
        match self.members(construct) {
            Ok(members) => Ok(members),
            Err(e) if e.status() == Some(404) && construct.area().is_some() => {
                Err(reconcile::Error::AreaNotFound {
                    area: construct.area().map(ToString::to_string).unwrap_or_default(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ServerStateWriter for HttpSession {
    fn grant(&mut self, construct: &Construct, identity: &Identity) -> anyhow::Result<()> {
        Ok(self.add(construct, identity)?)
    }

    fn revoke(&mut self, construct: &Construct, identity: &Identity) -> anyhow::Result<()> {
        Ok(self.remove(construct, identity)?)
    }
}

impl ServerSession for HttpSession {
    fn disconnect(&mut self) -> anyhow::Result<()> {
        Ok(self.logout()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_requires_user() {
        let connector = HttpConnector::default();
        let server = ServerConfig::new("https://rtc.example.com:9443/ccm").with_name("rtc1");

        let err = connector.login(&server).err().unwrap();
        assert!(matches!(err, Error::MissingCredentials(ref s) if s == "rtc1"));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let connector = HttpConnector::default();
        let server = ServerConfig::new("https://rtc.example.com:9443/ccm").with_name("rtc1");

        let err = connector.connect(&server).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<reconcile::Error>(),
            Some(reconcile::Error::Connection {
                retryable: false,
                ..
            })
        ));
    }
}
