use actix::{
    Actor, ActorContext, ActorFutureExt, AsyncContext, Context, Handler, ResponseActFuture,
    SpawnHandle, WrapFuture,
};
use faucet::Settlement;
use std::time::Duration;

/// Runs a settlement batch on a fixed interval.
///
/// A tick that fires while the previous batch is still running is skipped by
/// [`Settlement::run_batch`].
pub struct SettlementWorker {
    settlement: Settlement,
    interval: Duration,
    timer: Option<SpawnHandle>,
}

impl SettlementWorker {
    pub fn new(settlement: Settlement, interval: Duration) -> Self {
        Self {
            settlement,
            interval,
            timer: None,
        }
    }
}

impl Actor for SettlementWorker {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("started SettlementWorker, interval {:?}", self.interval);
        let timer = ctx.run_interval(self.interval, |act, ctx| {
            let settlement = act.settlement.clone();
            ctx.spawn(
                async move {
                    match settlement.run_batch(None).await {
                        Ok(report) if report.busy => {
                            tracing::debug!("previous settlement batch still running")
                        }
                        Ok(_) => {}
                        Err(error) => tracing::error!("settlement batch failed: {}", error),
                    }
                }
                .into_actor(act),
            );
        });
        self.timer = Some(timer);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("stopped SettlementWorker");
    }
}

/// Stops scheduling batches and waits up to `timeout` for the running one.
pub struct Shutdown {
    pub timeout: Duration,
}

impl actix::Message for Shutdown {
    type Result = ();
}

impl Handler<Shutdown> for SettlementWorker {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        if let Some(timer) = self.timer.take() {
            ctx.cancel_future(timer);
        }
        let settlement = self.settlement.clone();
        Box::pin(
            async move {
                if tokio::time::timeout(msg.timeout, settlement.wait_idle())
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        "settlement batch still running after {:?}, stopping anyway",
                        msg.timeout
                    );
                }
            }
            .into_actor(self)
            .map(|_, _, ctx| ctx.stop()),
        )
    }
}
