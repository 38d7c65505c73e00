//! Shared test doubles: a programmable platform transport and a scripted
//! push-event transport.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use steward_core::client::types::{
    AckReceipt, AlertRecord, AlertSeverity, AnalyticsQuery, GroupStatus, MetricsSnapshot,
    PlatformHealth, StepInvocation,
};
use steward_core::error::{StewardError, StewardResult};
use steward_core::events::{EventStream, EventTransport, StreamEvent};
use steward_core::PlatformTransport;

/// One scripted transport response
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Ok(Value),
    Fail(u16, String),
}

impl ScriptedResponse {
    fn into_result(self) -> StewardResult<Value> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Fail(status, message) => Err(StewardError::api_error(status, message)),
        }
    }
}

/// Record of one step invocation observed by the mock
#[derive(Debug, Clone)]
pub struct InvokeRecord {
    pub group: String,
    pub operation: String,
    pub service_id: String,
    pub parameters: Value,
    pub at: tokio::time::Instant,
}

/// Programmable in-memory platform transport
#[derive(Default)]
pub struct MockPlatformTransport {
    /// Scripted invoke results keyed by step id; exhausted scripts and
    /// unscripted steps succeed with a generic payload
    invoke_scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    pub invoke_log: Mutex<Vec<InvokeRecord>>,
    /// When present, each invocation waits for one permit before resolving
    pub gate: Option<Arc<Semaphore>>,

    pub health_groups: Mutex<HashMap<String, GroupStatus>>,
    pub status_groups: Mutex<HashMap<String, GroupStatus>>,
    pub alert_records: Mutex<Vec<AlertRecord>>,
    pub analytics: Mutex<Option<MetricsSnapshot>>,
    ack_script: Mutex<VecDeque<ScriptedResponse>>,

    pub health_fetches: AtomicU32,
    pub status_fetches: AtomicU32,
    pub alert_fetches: AtomicU32,
    pub analytics_fetches: AtomicU32,
    pub ack_calls: AtomicU32,
}

impl MockPlatformTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (transport, gate)
    }

    pub fn script_step(&self, step_id: &str, responses: Vec<ScriptedResponse>) {
        self.invoke_scripts
            .lock()
            .insert(step_id.to_string(), responses.into());
    }

    pub fn script_ack(&self, responses: Vec<ScriptedResponse>) {
        *self.ack_script.lock() = responses.into();
    }

    pub fn set_groups(&self, entries: &[(&str, GroupStatus)]) {
        let map: HashMap<String, GroupStatus> = entries
            .iter()
            .map(|(name, status)| (name.to_string(), *status))
            .collect();
        *self.health_groups.lock() = map.clone();
        *self.status_groups.lock() = map;
    }

    pub fn set_alerts(&self, records: Vec<AlertRecord>) {
        *self.alert_records.lock() = records;
    }

    pub fn invocations(&self) -> Vec<InvokeRecord> {
        self.invoke_log.lock().clone()
    }
}

#[async_trait]
impl PlatformTransport for MockPlatformTransport {
    async fn fetch_health(&self) -> StewardResult<PlatformHealth> {
        self.health_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(PlatformHealth {
            groups: self.health_groups.lock().clone(),
            generated_at: Utc::now(),
        })
    }

    async fn fetch_group_status(&self) -> StewardResult<HashMap<String, GroupStatus>> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.status_groups.lock().clone())
    }

    async fn fetch_alerts(
        &self,
        _groups: Option<&[String]>,
        _limit: Option<u32>,
    ) -> StewardResult<Vec<AlertRecord>> {
        self.alert_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.alert_records.lock().clone())
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> StewardResult<AckReceipt> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.ack_script.lock().pop_front();
        match scripted {
            Some(response) => response.into_result().map(|_| AckReceipt {
                alert_id: alert_id.to_string(),
                acknowledged: true,
            }),
            None => Ok(AckReceipt {
                alert_id: alert_id.to_string(),
                acknowledged: true,
            }),
        }
    }

    async fn fetch_analytics(&self, _query: &AnalyticsQuery) -> StewardResult<MetricsSnapshot> {
        self.analytics_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.analytics.lock().clone().unwrap_or(MetricsSnapshot {
            cpu_usage: 10.0,
            memory_usage: 20.0,
            average_latency_ms: 50.0,
            throughput: 100.0,
            error_rate: 0.0,
            availability: 100.0,
            generated_at: Utc::now(),
        }))
    }

    async fn invoke_operation(
        &self,
        group: &str,
        operation: &str,
        invocation: &StepInvocation,
    ) -> StewardResult<Value> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.invoke_log.lock().push(InvokeRecord {
            group: group.to_string(),
            operation: operation.to_string(),
            service_id: invocation.service_id.clone(),
            parameters: invocation.parameters.clone(),
            at: tokio::time::Instant::now(),
        });

        let scripted = self
            .invoke_scripts
            .lock()
            .get_mut(&invocation.service_id)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response.into_result(),
            None => Ok(json!({"status": "ok"})),
        }
    }
}

/// Script for one `open()` call on the push transport
pub enum ConnectScript {
    /// Connection attempt fails
    Fail(String),
    /// Connection succeeds, yields these events, then drops
    Deliver(Vec<StreamEvent>),
    /// Connection succeeds, yields these events, then stays open
    Hold(Vec<StreamEvent>),
}

/// Push transport driven by a queue of connection scripts; once the queue
/// is exhausted every further attempt holds an empty open connection.
#[derive(Default)]
pub struct ScriptedEventTransport {
    scripts: Mutex<VecDeque<ConnectScript>>,
    pub opens: AtomicU32,
    pub open_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedEventTransport {
    pub fn new(scripts: Vec<ConnectScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            opens: AtomicU32::new(0),
            open_times: Mutex::new(Vec::new()),
        }
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventTransport for ScriptedEventTransport {
    async fn open(&self) -> StewardResult<EventStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open_times.lock().push(tokio::time::Instant::now());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(ConnectScript::Hold(Vec::new()));
        match script {
            ConnectScript::Fail(message) => Err(StewardError::connection_failed(message)),
            ConnectScript::Deliver(events) => {
                Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
            }
            ConnectScript::Hold(events) => Ok(futures::stream::iter(events.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
        }
    }
}

/// Build an alert record for tests
pub fn alert_record(id: &str, severity: AlertSeverity, acknowledged: bool) -> AlertRecord {
    AlertRecord {
        id: id.to_string(),
        severity,
        title: format!("alert {id}"),
        description: String::new(),
        source_group: "scan".to_string(),
        is_acknowledged: acknowledged,
        timestamp: Utc::now(),
    }
}
