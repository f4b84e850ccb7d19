//! Token fan-out to dependent services.
//!
//! `register` pushes a token to `GET {base}/auth/token` on every configured
//! service so each can mint its own session cookie; `clear` hits
//! `DELETE {base}/auth/token` to drop it again. Services are handled
//! concurrently and independently: one unreachable service never stops the
//! others, and nothing here returns an error to the caller. Outcomes are
//! collected in a [`PropagationReport`].

use crate::errors::ClientError;
use crate::metrics::record_propagation_attempt;
use common::config::FetchOptions;
use common::retry::RetryPolicy;
use futures::future::join_all;
use reqwest::{Method, Url};
use common::secret::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument, warn};

/// Path every dependent service exposes for cookie registration.
pub const REGISTRATION_PATH: &str = "/auth/token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    Clear,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Clear => "clear",
        }
    }

    fn method(self) -> Method {
        match self {
            Operation::Register => Method::GET,
            Operation::Clear => Method::DELETE,
        }
    }
}

/// Result of one service's registration or clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutcome {
    pub service: Url,
    pub attempts: u32,
    /// Last error once attempts ran out; `None` on success.
    pub error: Option<ClientError>,
}

impl ServiceOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-service outcomes of one fan-out, in configured service order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    pub operation: Operation,
    pub outcomes: Vec<ServiceOutcome>,
}

impl PropagationReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ServiceOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ServiceOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ServiceOutcome::is_success)
    }

    /// Outcome for a given service base URL.
    #[must_use]
    pub fn outcome_for(&self, service: &Url) -> Option<&ServiceOutcome> {
        self.outcomes.iter().find(|o| &o.service == service)
    }
}

/// Pushes tokens to, and clears them from, a fixed set of services.
#[derive(Debug, Clone)]
pub struct Propagator {
    services: Vec<Url>,
    http_client: reqwest::Client,
    options: FetchOptions,
    home: Url,
    register_policy: RetryPolicy,
    clear_policy: RetryPolicy,
}

/// `{base}/auth/token`, keeping any path prefix on the base.
fn registration_url(base: &Url) -> Result<Url, ClientError> {
    let joined = format!("{}{REGISTRATION_PATH}", base.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| ClientError::Configuration(format!("Invalid service URL: {e}")))
}

impl Propagator {
    /// `home` is the origin the client runs on; it decides whether requests
    /// count as cross-origin under the fetch options.
    #[must_use]
    pub fn new(
        services: Vec<Url>,
        http_client: reqwest::Client,
        options: FetchOptions,
        home: Url,
    ) -> Self {
        Self {
            services,
            http_client,
            options,
            home,
            register_policy: RetryPolicy::default(),
            clear_policy: RetryPolicy::no_retry(),
        }
    }

    #[must_use]
    pub fn with_register_policy(mut self, policy: RetryPolicy) -> Self {
        self.register_policy = policy;
        self
    }

    #[must_use]
    pub fn with_clear_policy(mut self, policy: RetryPolicy) -> Self {
        self.clear_policy = policy;
        self
    }

    #[must_use]
    pub fn services(&self) -> &[Url] {
        &self.services
    }

    /// The shared client whose cookie store holds service session cookies.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Register `token` with every service.
    #[instrument(skip_all, fields(services = self.services.len()))]
    pub async fn register(&self, token: &SecretString) -> PropagationReport {
        self.fan_out(Operation::Register, Some(token), self.register_policy)
            .await
    }

    /// Ask every service to drop its session cookie. Best effort.
    #[instrument(skip_all, fields(services = self.services.len()))]
    pub async fn clear(&self) -> PropagationReport {
        self.fan_out(Operation::Clear, None, self.clear_policy).await
    }

    async fn fan_out(
        &self,
        operation: Operation,
        token: Option<&SecretString>,
        policy: RetryPolicy,
    ) -> PropagationReport {
        let outcomes = join_all(
            self.services
                .iter()
                .map(|service| self.propagate_one(operation, service, token, policy)),
        )
        .await;

        let report = PropagationReport {
            operation,
            outcomes,
        };

        let failed = report.failed().count();
        if failed == 0 {
            info!(
                target: "bridge.client.propagator",
                operation = operation.as_str(),
                services = report.outcomes.len(),
                "Propagation complete"
            );
        } else {
            warn!(
                target: "bridge.client.propagator",
                operation = operation.as_str(),
                failed = failed,
                services = report.outcomes.len(),
                "Propagation incomplete"
            );
        }
        report
    }

    async fn propagate_one(
        &self,
        operation: Operation,
        service: &Url,
        token: Option<&SecretString>,
        policy: RetryPolicy,
    ) -> ServiceOutcome {
        let target = match registration_url(service) {
            Ok(url) => url,
            Err(e) => {
                return ServiceOutcome {
                    service: service.clone(),
                    attempts: 0,
                    error: Some(e),
                }
            }
        };

        if let Err(e) = self.options.check_target(&self.home, &target) {
            record_propagation_attempt(operation.as_str(), "blocked");
            return ServiceOutcome {
                service: service.clone(),
                attempts: 0,
                error: Some(e.into()),
            };
        }

        let outcome = policy
            .run(|attempt| {
                let target = target.clone();
                async move {
                    debug!(
                        target: "bridge.client.propagator",
                        operation = operation.as_str(),
                        service = %target.origin().ascii_serialization(),
                        attempt = attempt,
                        "Sending"
                    );
                    let result = self.send(operation, target, token).await;
                    record_propagation_attempt(
                        operation.as_str(),
                        match &result {
                            Ok(()) => "success",
                            Err(e) => e.label(),
                        },
                    );
                    result
                }
            })
            .await;

        if let Err(e) = &outcome.result {
            warn!(
                target: "bridge.client.propagator",
                operation = operation.as_str(),
                service = %service,
                attempts = outcome.attempts,
                error = %e,
                "Giving up on service"
            );
        }

        ServiceOutcome {
            service: service.clone(),
            attempts: outcome.attempts,
            error: outcome.result.err(),
        }
    }

    async fn send(
        &self,
        operation: Operation,
        target: Url,
        token: Option<&SecretString>,
    ) -> Result<(), ClientError> {
        let request = self.http_client.request(operation.method(), target.clone());
        let mut request = self.options.apply_headers(&self.home, &target, request);
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::HttpStatus(status.as_u16()))
        }
    }
}
