//! Register reachable hosts as OPSI clients.
//!
//! Hosts are processed one at a time. Each host is looked up first and only
//! created when missing, so repeated runs never duplicate clients. Creation
//! tries the structured `host_createOpsiClient` signature, then the
//! positional one; see [`CreateAttempt`].

use std::collections::HashMap;

use netinv_core::config::{OpsiConfig, RegistrationConfig};
use netinv_core::ProbeResult;
use serde_json::{json, Value};

use crate::client::{OpsiApi, OpsiClient};
use crate::template;

/// Aggregated outcome of a registration phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistrationSummary {
    /// Client ids created during this run.
    pub registered: Vec<String>,
    /// One message per host that could not be handled.
    pub failures: Vec<String>,
}

/// Everything needed to create one OPSI client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRequest {
    pub id: String,
    pub mac: Option<String>,
    pub ip: String,
    pub notes: String,
    pub inventory_number: Option<String>,
}

impl ClientRequest {
    pub fn new(host: &ProbeResult, config: &RegistrationConfig) -> Self {
        let inventory_number = Some(config.inventory_number.trim())
            .filter(|n| !n.is_empty())
            .map(String::from);
        Self {
            id: client_id(host, config),
            mac: host.mac.clone(),
            ip: host.ip.to_string(),
            notes: build_notes(host, config),
            inventory_number,
        }
    }

    /// Parameters for the object-style `host_createOpsiClient` call.
    pub fn structured_params(&self) -> Vec<Value> {
        vec![json!({
            "id": self.id,
            "hardwareAddress": self.mac,
            "ipAddress": self.ip,
            "description": self.notes,
            "notes": self.notes,
        })]
    }

    /// Parameters for the positional `host_createOpsiClient` call.
    pub fn positional_params(&self) -> Vec<Value> {
        let mut params = vec![
            json!(self.id),
            json!(self.mac),
            json!(self.ip),
            json!(self.notes),
        ];
        if let Some(number) = &self.inventory_number {
            params.push(json!(number));
        }
        params
    }
}

/// Which `host_createOpsiClient` signature the backend accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Structured,
    Positional,
}

/// Two-attempt client creation.
///
/// `TryStructured` → `Created` on success, else `TryPositional`;
/// `TryPositional` → `Created` on success, else `Failed`. `Created` and
/// `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateAttempt {
    TryStructured,
    TryPositional {
        structured_error: String,
    },
    Created {
        signature: Signature,
    },
    Failed {
        structured_error: String,
        positional_error: String,
    },
}

impl CreateAttempt {
    /// Call parameters for the pending attempt; `None` once terminal.
    pub fn params(&self, request: &ClientRequest) -> Option<Vec<Value>> {
        match self {
            Self::TryStructured => Some(request.structured_params()),
            Self::TryPositional { .. } => Some(request.positional_params()),
            Self::Created { .. } | Self::Failed { .. } => None,
        }
    }

    /// Move to the next state given the outcome of the pending attempt.
    pub fn advance(self, outcome: Result<(), String>) -> Self {
        match (self, outcome) {
            (Self::TryStructured, Ok(())) => Self::Created {
                signature: Signature::Structured,
            },
            (Self::TryStructured, Err(e)) => Self::TryPositional {
                structured_error: e,
            },
            (Self::TryPositional { .. }, Ok(())) => Self::Created {
                signature: Signature::Positional,
            },
            (Self::TryPositional { structured_error }, Err(e)) => Self::Failed {
                structured_error,
                positional_error: e,
            },
            (terminal, _) => terminal,
        }
    }
}

/// Canonical OPSI client id for a host, always lowercase.
///
/// A hostname that already contains a dot is used as is; otherwise the
/// configured template is rendered with `{hostname}`, `{domain}` and `{ip}`.
pub fn client_id(host: &ProbeResult, config: &RegistrationConfig) -> String {
    let ip = host.ip.to_string();
    let hostname = match host.hostname.as_deref().filter(|h| !h.is_empty()) {
        Some(h) if h.contains('.') => return h.to_lowercase(),
        Some(h) => h.to_string(),
        None => format!("auto-{}", ip.replace(['.', ':'], "-")),
    };

    let vars = HashMap::from([
        ("hostname", hostname.clone()),
        ("domain", config.fallback_domain.clone()),
        ("ip", ip),
    ]);

    let candidate = match template::render(&config.client_id_template, &vars) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(
                template = %config.client_id_template,
                error = %e,
                "Invalid client id template; using hostname.domain"
            );
            format!("{hostname}.{}", config.fallback_domain)
        }
    };

    candidate.to_lowercase()
}

/// Free-text notes for a host; the raw template when it cannot be rendered.
pub fn build_notes(host: &ProbeResult, config: &RegistrationConfig) -> String {
    let notes = &config.notes;
    if notes.is_empty() {
        return String::new();
    }

    let mut vars = HashMap::from([
        ("ip", host.ip.to_string()),
        ("reachable", host.reachable.to_string()),
    ]);
    if let Some(latency) = host.latency_ms {
        vars.insert("latency_ms", latency.to_string());
    }
    for (key, value) in [
        ("hostname", &host.hostname),
        ("mac", &host.mac),
        ("error", &host.error),
    ] {
        if let Some(v) = value {
            vars.insert(key, v.clone());
        }
    }

    template::render(notes, &vars).unwrap_or_else(|_| notes.clone())
}

/// Run the create state machine against `api` for one request.
pub async fn create_client<A: OpsiApi + ?Sized>(
    api: &A,
    request: &ClientRequest,
) -> CreateAttempt {
    let mut attempt = CreateAttempt::TryStructured;
    while let Some(params) = attempt.params(request) {
        let outcome = api
            .call("host_createOpsiClient", params)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        attempt = attempt.advance(outcome);
    }
    attempt
}

/// Register every host with the backend behind `api`.
pub async fn register_hosts<A: OpsiApi + ?Sized>(
    api: &A,
    hosts: &[ProbeResult],
    config: &RegistrationConfig,
) -> RegistrationSummary {
    let mut summary = RegistrationSummary::default();

    for host in hosts {
        let request = ClientRequest::new(host, config);
        let client_id = request.id.clone();

        let existing = match api
            .call("host_getObjects", vec![json!([]), json!({ "id": client_id })])
            .await
        {
            Ok(v) => v,
            Err(e) => {
                summary
                    .failures
                    .push(format!("{client_id}: failed to query existing clients ({e})"));
                continue;
            }
        };

        if is_present(&existing) {
            tracing::info!(client_id = %client_id, "Client already present; skipping creation");
            continue;
        }

        match create_client(api, &request).await {
            CreateAttempt::Created { signature } => {
                tracing::info!(
                    client_id = %client_id,
                    ip = %request.ip,
                    signature = ?signature,
                    "Registered new OPSI client"
                );
                summary.registered.push(client_id.clone());
            }
            CreateAttempt::Failed {
                structured_error,
                positional_error,
            } => {
                tracing::warn!(
                    client_id = %client_id,
                    error = %structured_error,
                    fallback_error = %positional_error,
                    "Failed to create client"
                );
                summary.failures.push(format!(
                    "{client_id}: creation failed ({structured_error}); fallback failed ({positional_error})"
                ));
                continue;
            }
            pending => {
                summary
                    .failures
                    .push(format!("{client_id}: creation did not complete ({pending:?})"));
                continue;
            }
        }

        if !config.default_group.is_empty() {
            let params = vec![
                json!("HostGroup"),
                json!(config.default_group),
                json!(client_id),
            ];
            match api.call("objectToGroup_create", params).await {
                Ok(_) => tracing::debug!(client_id = %client_id, group = %config.default_group, "Added client to group"),
                Err(e) => tracing::warn!(
                    client_id = %client_id,
                    group = %config.default_group,
                    error = %e,
                    "Could not add client to group"
                ),
            }
        }

        if config.trigger_hwscan {
            let params = vec![json!("auditHardware"), json!(client_id), json!("setup")];
            match api.call("setProductActionRequest", params).await {
                Ok(_) => tracing::debug!(client_id = %client_id, "Queued auditHardware"),
                Err(e) => tracing::warn!(
                    client_id = %client_id,
                    error = %e,
                    "Could not enqueue hardware inventory"
                ),
            }
        }
    }

    summary
}

/// Build a client from configuration and register `hosts`.
///
/// A configuration that cannot produce a client aborts the phase with a
/// single failure and nothing registered.
pub async fn register_reachable(
    opsi: &OpsiConfig,
    config: &RegistrationConfig,
    hosts: &[ProbeResult],
) -> RegistrationSummary {
    let client = match OpsiClient::from_config(opsi) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Skipping registration");
            return RegistrationSummary {
                registered: Vec::new(),
                failures: vec![e.to_string()],
            };
        }
    };

    register_hosts(&client, hosts, config).await
}

/// Whether a `host_getObjects` result names at least one object.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::client::RpcError;

    /// In-memory backend that records calls and keeps created clients.
    #[derive(Default)]
    struct FakeOpsi {
        clients: Mutex<HashSet<String>>,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        reject_structured: bool,
        reject_positional: bool,
        fail_query: bool,
        fail_hwscan: bool,
    }

    impl FakeOpsi {
        fn methods(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect()
        }

        fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == method)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    fn api_error(message: &str) -> RpcError {
        RpcError::Api(json!({ "message": message }))
    }

    #[async_trait]
    impl OpsiApi for FakeOpsi {
        async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.clone()));

            match method {
                "host_getObjects" => {
                    if self.fail_query {
                        return Err(api_error("backend unavailable"));
                    }
                    let id = params[1]["id"].as_str().unwrap_or_default().to_string();
                    if self.clients.lock().unwrap().contains(&id) {
                        Ok(json!([{ "id": id }]))
                    } else {
                        Ok(json!([]))
                    }
                }
                "host_createOpsiClient" => {
                    let (id, rejected) = match &params[0] {
                        Value::Object(obj) => (obj["id"].clone(), self.reject_structured),
                        other => (other.clone(), self.reject_positional),
                    };
                    if rejected {
                        return Err(api_error("invalid signature"));
                    }
                    let id = id.as_str().unwrap_or_default().to_string();
                    self.clients.lock().unwrap().insert(id);
                    Ok(Value::Null)
                }
                "setProductActionRequest" if self.fail_hwscan => Err(api_error("no such product")),
                _ => Ok(Value::Null),
            }
        }
    }

    fn host(ip: &str, hostname: Option<&str>, mac: Option<&str>) -> ProbeResult {
        let mut r = ProbeResult::reachable(ip.parse::<IpAddr>().unwrap(), 1.25);
        r.hostname = hostname.map(String::from);
        r.mac = mac.map(String::from);
        r
    }

    fn config() -> RegistrationConfig {
        RegistrationConfig {
            auto_register: true,
            fallback_domain: "corp.local".to_string(),
            default_group: String::new(),
            ..RegistrationConfig::default()
        }
    }

    #[test]
    fn client_id_from_short_hostname() {
        let id = client_id(&host("10.0.0.5", Some("web01"), None), &config());
        assert_eq!(id, "web01.corp.local");
    }

    #[test]
    fn client_id_keeps_qualified_hostname() {
        let id = client_id(&host("10.0.0.5", Some("DB01.Example.COM"), None), &config());
        assert_eq!(id, "db01.example.com");
    }

    #[test]
    fn client_id_synthesized_without_hostname() {
        let cfg = config();
        assert_eq!(
            client_id(&host("10.0.0.5", None, None), &cfg),
            "auto-10-0-0-5.corp.local"
        );
        assert_eq!(
            client_id(&host("10.0.0.6", Some(""), None), &cfg),
            "auto-10-0-0-6.corp.local"
        );
    }

    #[test]
    fn client_id_template_with_ip_and_bad_template() {
        let mut cfg = config();
        cfg.client_id_template = "{hostname}-{ip}.{domain}".to_string();
        assert_eq!(
            client_id(&host("10.0.0.5", Some("Web01"), None), &cfg),
            "web01-10.0.0.5.corp.local"
        );

        cfg.client_id_template = "{hostname}.{serial}".to_string();
        assert_eq!(
            client_id(&host("10.0.0.5", Some("web01"), None), &cfg),
            "web01.corp.local"
        );
    }

    #[test]
    fn notes_render_host_fields() {
        let mut cfg = config();
        cfg.notes = "seen at {ip} ({hostname})".to_string();
        let notes = build_notes(&host("10.0.0.5", Some("web01"), None), &cfg);
        assert_eq!(notes, "seen at 10.0.0.5 (web01)");
    }

    #[test]
    fn notes_fall_back_to_literal_template() {
        let mut cfg = config();
        cfg.notes = "mac {mac}".to_string();
        assert_eq!(build_notes(&host("10.0.0.5", None, None), &cfg), "mac {mac}");

        cfg.notes = String::new();
        assert_eq!(build_notes(&host("10.0.0.5", None, None), &cfg), "");
    }

    #[test]
    fn positional_params_append_inventory_number_only_when_set() {
        let mut cfg = config();
        let h = host("10.0.0.5", Some("web01"), Some("aa:bb:cc:dd:ee:ff"));
        let request = ClientRequest::new(&h, &cfg);
        assert_eq!(request.positional_params().len(), 4);
        assert_eq!(request.positional_params()[1], json!("aa:bb:cc:dd:ee:ff"));

        cfg.inventory_number = "INV-42".to_string();
        let request = ClientRequest::new(&h, &cfg);
        let params = request.positional_params();
        assert_eq!(params.len(), 5);
        assert_eq!(params[4], json!("INV-42"));

        let structured = &request.structured_params()[0];
        assert_eq!(structured["id"], "web01.corp.local");
        assert_eq!(structured["ipAddress"], "10.0.0.5");
        assert_eq!(structured["description"], structured["notes"]);
    }

    #[test]
    fn create_attempt_transitions() {
        let start = CreateAttempt::TryStructured;
        assert_eq!(
            start.clone().advance(Ok(())),
            CreateAttempt::Created {
                signature: Signature::Structured
            }
        );

        let retry = start.advance(Err("bad params".to_string()));
        assert_eq!(
            retry,
            CreateAttempt::TryPositional {
                structured_error: "bad params".to_string()
            }
        );
        assert_eq!(
            retry.clone().advance(Ok(())),
            CreateAttempt::Created {
                signature: Signature::Positional
            }
        );

        let failed = retry.advance(Err("still bad".to_string()));
        assert_eq!(
            failed,
            CreateAttempt::Failed {
                structured_error: "bad params".to_string(),
                positional_error: "still bad".to_string(),
            }
        );
        assert_eq!(failed.clone().advance(Ok(())), failed);

        let request = ClientRequest::new(&host("10.0.0.5", None, None), &config());
        assert!(failed.params(&request).is_none());
    }

    #[tokio::test]
    async fn registers_new_host_and_queues_audit() {
        let api = FakeOpsi::default();
        let hosts = vec![host("10.0.0.5", Some("web01"), Some("aa:bb:cc:dd:ee:ff"))];

        let summary = register_hosts(&api, &hosts, &config()).await;

        assert_eq!(summary.registered, vec!["web01.corp.local"]);
        assert!(summary.failures.is_empty());
        assert_eq!(
            api.methods(),
            vec![
                "host_getObjects",
                "host_createOpsiClient",
                "setProductActionRequest"
            ]
        );
        assert_eq!(
            api.calls_to("setProductActionRequest")[0],
            vec![json!("auditHardware"), json!("web01.corp.local"), json!("setup")]
        );
    }

    #[tokio::test]
    async fn second_run_skips_existing_clients() {
        let api = FakeOpsi::default();
        let hosts = vec![
            host("10.0.0.5", Some("web01"), None),
            host("10.0.0.6", None, None),
        ];

        let first = register_hosts(&api, &hosts, &config()).await;
        assert_eq!(first.registered.len(), 2);

        let second = register_hosts(&api, &hosts, &config()).await;
        assert!(second.registered.is_empty());
        assert!(second.failures.is_empty());
        assert_eq!(api.calls_to("host_createOpsiClient").len(), 2);
        assert_eq!(api.clients.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn positional_fallback_registers_host() {
        let api = FakeOpsi {
            reject_structured: true,
            ..FakeOpsi::default()
        };
        let hosts = vec![host("10.0.0.5", Some("web01"), None)];

        let summary = register_hosts(&api, &hosts, &config()).await;

        assert_eq!(summary.registered, vec!["web01.corp.local"]);
        assert!(summary.failures.is_empty());
        let creates = api.calls_to("host_createOpsiClient");
        assert_eq!(creates.len(), 2);
        assert!(creates[0][0].is_object());
        assert_eq!(creates[1][0], json!("web01.corp.local"));
    }

    #[tokio::test]
    async fn both_signatures_failing_records_combined_failure() {
        let api = FakeOpsi {
            reject_structured: true,
            reject_positional: true,
            ..FakeOpsi::default()
        };
        let hosts = vec![
            host("10.0.0.5", Some("web01"), None),
            host("10.0.0.6", Some("web02"), None),
        ];

        let summary = register_hosts(&api, &hosts, &config()).await;

        assert!(summary.registered.is_empty());
        assert_eq!(summary.failures.len(), 2);
        assert!(summary.failures[0].starts_with("web01.corp.local: creation failed ("));
        assert!(summary.failures[0].contains("; fallback failed ("));
        assert!(api.calls_to("setProductActionRequest").is_empty());
    }

    #[tokio::test]
    async fn query_failure_is_isolated_per_host() {
        let api = FakeOpsi {
            fail_query: true,
            ..FakeOpsi::default()
        };
        let hosts = vec![
            host("10.0.0.5", Some("web01"), None),
            host("10.0.0.6", Some("web02"), None),
        ];

        let summary = register_hosts(&api, &hosts, &config()).await;

        assert!(summary.registered.is_empty());
        assert_eq!(summary.failures.len(), 2);
        assert!(summary.failures[1].contains("failed to query existing clients"));
        assert!(api.calls_to("host_createOpsiClient").is_empty());
    }

    #[tokio::test]
    async fn audit_failure_does_not_affect_outcome() {
        let api = FakeOpsi {
            fail_hwscan: true,
            ..FakeOpsi::default()
        };
        let summary = register_hosts(&api, &[host("10.0.0.5", None, None)], &config()).await;
        assert_eq!(summary.registered, vec!["auto-10-0-0-5.corp.local"]);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn group_assignment_when_configured() {
        let api = FakeOpsi::default();
        let mut cfg = config();
        cfg.default_group = "inventory-auto".to_string();
        cfg.trigger_hwscan = false;

        register_hosts(&api, &[host("10.0.0.5", Some("web01"), None)], &cfg).await;

        assert_eq!(
            api.calls_to("objectToGroup_create")[0],
            vec![
                json!("HostGroup"),
                json!("inventory-auto"),
                json!("web01.corp.local")
            ]
        );
        assert!(api.calls_to("setProductActionRequest").is_empty());
    }

    #[tokio::test]
    async fn invalid_api_config_aborts_phase() {
        let opsi = OpsiConfig::default();
        let summary =
            register_reachable(&opsi, &config(), &[host("10.0.0.5", None, None)]).await;
        assert!(summary.registered.is_empty());
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].contains("api_url, username, and password"));
    }
}
