//! POI reconciliation steps
//!
//! Every error is reported as a plain failure: reconciliation never escalates.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{PoiContext, PoiStep};
use crate::engine::{EngineError, ShieldedEngine};
use crate::workflow::{Stage, StageError, StageResult};

pub const REFRESH_SPENT_POIS: &str = "RefreshSpentPois";
pub const REFRESH_RECEIVE_POIS: &str = "RefreshReceivePois";
pub const GENERATE_POIS: &str = "GeneratePois";

fn downgrade(result: Result<(), EngineError>, step: PoiStep) -> StageResult<PoiStep> {
    match result {
        Ok(()) => StageResult::Success(step),
        Err(e) => StageResult::Failure(StageError::from(e)),
    }
}

pub struct RefreshSpentPois {
    engine: Arc<dyn ShieldedEngine>,
}

impl RefreshSpentPois {
    pub fn new(engine: Arc<dyn ShieldedEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Stage<PoiContext> for RefreshSpentPois {
    fn name(&self) -> &'static str {
        REFRESH_SPENT_POIS
    }

    async fn execute(&self, ctx: &PoiContext, _cancel: &CancellationToken) -> StageResult<PoiStep> {
        let result = self
            .engine
            .refresh_spent_pois(&ctx.network, &ctx.wallet_id)
            .await;
        if result.is_ok() {
            info!(wallet_id = %ctx.wallet_id, "Spent POIs refreshed");
        }
        downgrade(result, PoiStep::SpentRefreshed)
    }
}

pub struct RefreshReceivePois {
    engine: Arc<dyn ShieldedEngine>,
}

impl RefreshReceivePois {
    pub fn new(engine: Arc<dyn ShieldedEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Stage<PoiContext> for RefreshReceivePois {
    fn name(&self) -> &'static str {
        REFRESH_RECEIVE_POIS
    }

    async fn execute(&self, ctx: &PoiContext, _cancel: &CancellationToken) -> StageResult<PoiStep> {
        let result = self
            .engine
            .refresh_receive_pois(&ctx.network, &ctx.wallet_id)
            .await;
        if result.is_ok() {
            info!(wallet_id = %ctx.wallet_id, "Receive POIs refreshed");
        }
        downgrade(result, PoiStep::ReceiveRefreshed)
    }
}

pub struct GeneratePois {
    engine: Arc<dyn ShieldedEngine>,
}

impl GeneratePois {
    pub fn new(engine: Arc<dyn ShieldedEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Stage<PoiContext> for GeneratePois {
    fn name(&self) -> &'static str {
        GENERATE_POIS
    }

    async fn execute(&self, ctx: &PoiContext, _cancel: &CancellationToken) -> StageResult<PoiStep> {
        let result = self.engine.generate_pois(&ctx.network, &ctx.wallet_id).await;
        if result.is_ok() {
            info!(wallet_id = %ctx.wallet_id, "POI generation triggered");
        }
        downgrade(result, PoiStep::GenerationTriggered)
    }
}
