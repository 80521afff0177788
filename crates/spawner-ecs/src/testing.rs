//! Scripted cluster backend for orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use spawner_core::{Context, UnitStatus};

use crate::backend::{
    Attachment, ClusterBackend, RunIdPage, RunRequest, SubmittedRun, UnitDescription,
};
use crate::error::BackendError;

/// A call the backend received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit { cluster: String, task_definition: String },
    Describe { cluster: String, run_id: String },
    Stop { cluster: String, run_id: String },
    List { cluster: String, page_token: Option<String> },
    Resolve { attachment_id: String },
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    submitted: Vec<RunRequest>,
    submit: Option<Result<SubmittedRun, String>>,
    submit_unreadable: bool,
    statuses: HashMap<String, VecDeque<Result<UnitStatus, String>>>,
    attachments: HashMap<String, Vec<Attachment>>,
    addresses: HashMap<String, Result<String, String>>,
    pages: HashMap<Option<String>, RunIdPage>,
    stop_error: Option<String>,
}

/// Backend whose answers are scripted up front.
///
/// Status scripts are consumed one entry per describe; the last entry
/// repeats forever.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(self, f: impl FnOnce(&mut Script)) -> Self {
        f(&mut self.script.lock().unwrap());
        self
    }

    pub fn accept_run(self, run_id: &str, cluster: &str) -> Self {
        let run = SubmittedRun {
            run_id: run_id.to_string(),
            cluster_ref: Some(cluster.to_string()),
        };
        self.edit(|s| s.submit = Some(Ok(run)))
    }

    pub fn reject_runs(self, message: &str) -> Self {
        self.edit(|s| s.submit = Some(Err(message.to_string())))
    }

    /// The run request gets an answer that cannot be decoded.
    pub fn unreadable_run_answer(self) -> Self {
        self.edit(|s| s.submit_unreadable = true)
    }

    pub fn statuses<I>(self, run_id: &str, statuses: I) -> Self
    where
        I: IntoIterator<Item = UnitStatus>,
    {
        self.edit(|s| {
            s.statuses
                .entry(run_id.to_string())
                .or_default()
                .extend(statuses.into_iter().map(Ok));
        })
    }

    pub fn describe_error(self, run_id: &str, message: &str) -> Self {
        self.edit(|s| {
            s.statuses
                .entry(run_id.to_string())
                .or_default()
                .push_back(Err(message.to_string()));
        })
    }

    pub fn attachments(self, run_id: &str, attachments: Vec<Attachment>) -> Self {
        self.edit(|s| {
            s.attachments.insert(run_id.to_string(), attachments);
        })
    }

    pub fn eni(self, run_id: &str, eni: &str) -> Self {
        self.attachments(run_id, vec![Attachment::network_interface(eni)])
    }

    pub fn address(self, eni: &str, address: &str) -> Self {
        self.edit(|s| {
            s.addresses.insert(eni.to_string(), Ok(address.to_string()));
        })
    }

    pub fn address_error(self, eni: &str, message: &str) -> Self {
        self.edit(|s| {
            s.addresses.insert(eni.to_string(), Err(message.to_string()));
        })
    }

    pub fn page<I, S>(self, token: Option<&str>, run_ids: I, next: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let page = RunIdPage {
            run_ids: run_ids.into_iter().map(Into::into).collect(),
            next_token: next.map(str::to_string),
        };
        self.edit(|s| {
            s.pages.insert(token.map(str::to_string), page);
        })
    }

    pub fn fail_stops(self, message: &str) -> Self {
        self.edit(|s| s.stop_error = Some(message.to_string()))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn submitted(&self) -> Vec<RunRequest> {
        self.script.lock().unwrap().submitted.clone()
    }

    pub fn stops(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Stop { cluster, run_id } => Some((cluster, run_id)),
                _ => None,
            })
            .collect()
    }

    pub fn describe_count(&self, run_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Describe { run_id: id, .. } if id == run_id))
            .count()
    }

    /// Record `call` unless `ctx` has already ended.
    fn enter(&self, ctx: &Context, call: Call) -> Result<std::sync::MutexGuard<'_, Script>, BackendError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        Ok(script)
    }
}

#[async_trait]
impl ClusterBackend for ScriptedBackend {
    async fn submit_run(
        &self,
        ctx: &Context,
        request: &RunRequest,
    ) -> Result<SubmittedRun, BackendError> {
        let mut script = self.enter(
            ctx,
            Call::Submit {
                cluster: request.cluster.clone(),
                task_definition: request.task_definition.clone(),
            },
        )?;
        script.submitted.push(request.clone());
        if script.submit_unreadable {
            return Err(BackendError::Malformed("RunTask response: EOF".to_string()));
        }
        match script.submit.clone() {
            Some(Ok(run)) => Ok(run),
            Some(Err(message)) => Err(BackendError::Api {
                code: "InvalidParameterException".to_string(),
                message,
            }),
            None => Err(BackendError::Failure("run task: unable to fulfil request".to_string())),
        }
    }

    async fn describe(
        &self,
        ctx: &Context,
        cluster: &str,
        run_id: &str,
    ) -> Result<UnitDescription, BackendError> {
        let mut script = self.enter(
            ctx,
            Call::Describe {
                cluster: cluster.to_string(),
                run_id: run_id.to_string(),
            },
        )?;
        let queue = script
            .statuses
            .get_mut(run_id)
            .ok_or_else(|| BackendError::Failure(format!("describe task: MISSING {run_id}")))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        let status = match next {
            Some(Ok(status)) => status,
            Some(Err(message)) => return Err(BackendError::Transport(message)),
            None => return Err(BackendError::Failure(format!("describe task: MISSING {run_id}"))),
        };
        Ok(UnitDescription {
            run_id: run_id.to_string(),
            cluster_ref: Some(cluster.to_string()),
            status,
            attachments: script.attachments.get(run_id).cloned().unwrap_or_default(),
        })
    }

    async fn stop(&self, ctx: &Context, cluster: &str, run_id: &str) -> Result<(), BackendError> {
        let script = self.enter(
            ctx,
            Call::Stop {
                cluster: cluster.to_string(),
                run_id: run_id.to_string(),
            },
        )?;
        match &script.stop_error {
            Some(message) => Err(BackendError::Failure(message.clone())),
            None => Ok(()),
        }
    }

    async fn list_run_ids(
        &self,
        ctx: &Context,
        cluster: &str,
        page_token: Option<&str>,
    ) -> Result<RunIdPage, BackendError> {
        let script = self.enter(
            ctx,
            Call::List {
                cluster: cluster.to_string(),
                page_token: page_token.map(str::to_string),
            },
        )?;
        Ok(script
            .pages
            .get(&page_token.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_address(
        &self,
        ctx: &Context,
        attachment_id: &str,
    ) -> Result<String, BackendError> {
        let script = self.enter(
            ctx,
            Call::Resolve {
                attachment_id: attachment_id.to_string(),
            },
        )?;
        match script.addresses.get(attachment_id) {
            Some(Ok(address)) => Ok(address.clone()),
            Some(Err(message)) => Err(BackendError::Api {
                code: "InvalidNetworkInterfaceID.NotFound".to_string(),
                message: message.clone(),
            }),
            None => Err(BackendError::Failure(format!(
                "no interface found for {attachment_id}"
            ))),
        }
    }
}
