//! POI Reconciliation
//!
//! Best-effort follow-up after a transfer (or on demand): refresh spent POIs,
//! refresh receive POIs, trigger POI generation. Each step is attempted even
//! when an earlier one failed; failures are reported as warnings.

pub mod stages;

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core_types::WalletId;
use crate::engine::ShieldedEngine;
use crate::workflow::{StageContext, StageList, StageWarning, WorkflowExecutor, WorkflowRun};
use stages::{GeneratePois, RefreshReceivePois, RefreshSpentPois};

pub const WORKFLOW_NAME: &str = "poi_reconciliation";

/// Which steps succeeded in this run. Flags only ever go false → true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoiRefreshState {
    pub spent_refreshed: bool,
    pub receive_refreshed: bool,
    pub generation_triggered: bool,
}

impl PoiRefreshState {
    pub fn is_complete(&self) -> bool {
        self.spent_refreshed && self.receive_refreshed && self.generation_triggered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiStep {
    SpentRefreshed,
    ReceiveRefreshed,
    GenerationTriggered,
}

#[derive(Debug, Clone)]
pub struct PoiContext {
    pub network: String,
    pub wallet_id: WalletId,
    pub state: PoiRefreshState,
}

impl StageContext for PoiContext {
    type Output = PoiStep;

    fn merge(&mut self, step: PoiStep) {
        match step {
            PoiStep::SpentRefreshed => self.state.spent_refreshed = true,
            PoiStep::ReceiveRefreshed => self.state.receive_refreshed = true,
            PoiStep::GenerationTriggered => self.state.generation_triggered = true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub run: WorkflowRun,
    pub state: PoiRefreshState,
    pub warnings: Vec<StageWarning>,
}

pub struct ReconciliationManager {
    network: String,
    stages: StageList<PoiContext>,
}

impl ReconciliationManager {
    pub fn new(engine: Arc<dyn ShieldedEngine>, network: impl Into<String>) -> Self {
        let stages: StageList<PoiContext> = vec![
            Arc::new(RefreshSpentPois::new(engine.clone())),
            Arc::new(RefreshReceivePois::new(engine.clone())),
            Arc::new(GeneratePois::new(engine)),
        ];
        Self {
            network: network.into(),
            stages,
        }
    }

    pub async fn reconcile(
        &self,
        wallet_id: &WalletId,
        cancel: &CancellationToken,
    ) -> ReconciliationReport {
        let ctx = PoiContext {
            network: self.network.clone(),
            wallet_id: wallet_id.clone(),
            state: PoiRefreshState::default(),
        };

        let (run, ctx) = WorkflowExecutor::best_effort()
            .run(WORKFLOW_NAME, wallet_id, &self.stages, ctx, cancel)
            .await;

        ReconciliationReport {
            warnings: run.warnings.clone(),
            state: ctx.state,
            run,
        }
    }
}
