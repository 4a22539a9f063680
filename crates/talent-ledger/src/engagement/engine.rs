use std::sync::Arc;

use crate::config::EngineConfig;

use super::approval::ApprovalGate;
use super::lifecycle::ApplicationLifecycle;
use super::repository::{
    SharedApplicationStore, SharedJobPosts, SharedNotifications, SharedPaymentLedger,
    SharedProfiles, SharedTaskStore,
};
use super::settlement::SettlementEngine;
use super::tracker::TaskTracker;

/// Storage and collaborator handles the engine is assembled from.
#[derive(Clone)]
pub struct EnginePorts {
    pub applications: SharedApplicationStore,
    pub tasks: SharedTaskStore,
    pub ledger: SharedPaymentLedger,
    pub postings: SharedJobPosts,
    pub profiles: SharedProfiles,
    pub notifications: SharedNotifications,
}

/// Facade bundling the lifecycle, tracker, approval gate and settlement engine.
pub struct EngagementEngine {
    lifecycle: Arc<ApplicationLifecycle>,
    tracker: TaskTracker,
    approvals: ApprovalGate,
    settlement: SettlementEngine,
}

impl EngagementEngine {
    pub fn new(ports: EnginePorts, config: &EngineConfig) -> Self {
        let EnginePorts {
            applications,
            tasks,
            ledger,
            postings,
            profiles,
            notifications,
        } = ports;

        let lifecycle = Arc::new(ApplicationLifecycle::new(
            applications,
            postings,
            profiles,
            notifications,
        ));
        let tracker = TaskTracker::new(tasks.clone(), lifecycle.clone());
        let approvals = ApprovalGate::new(tasks.clone(), lifecycle.clone(), config.remarks_limit);
        let settlement = SettlementEngine::new(tasks, ledger, lifecycle.clone());

        Self {
            lifecycle,
            tracker,
            approvals,
            settlement,
        }
    }

    pub fn lifecycle(&self) -> &ApplicationLifecycle {
        &self.lifecycle
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn approvals(&self) -> &ApprovalGate {
        &self.approvals
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }
}
