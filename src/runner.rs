//! The scheduler: launches workflows, virtual users and activity
//! producers, and drives them to completion, fanning results out over a
//! `mpsc::Sender<Event>` and tracking task lifetimes with `JoinSet`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::{Activity, ActivityType, Config, Rate, Workflow};
use crate::dialect;
use crate::error::DrkError;
use crate::event::Event;
use crate::queryer::Queryer;
use crate::value::{Row, Value};
use crate::vu::{EnvMapper, Globals, Vu};

const INIT_WORKFLOW: &str = "init";

#[derive(Clone)]
pub struct Runner {
    db: Arc<dyn Queryer>,
    config: Arc<Config>,
    env_mappings: EnvMapper,
    duration: Duration,
    events: mpsc::Sender<Event>,
    globals: Globals,
}

impl Runner {
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn Queryer>,
        duration: Duration,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let env_mappings = EnvMapper::new(config.env_mappings.clone());
        Runner {
            db,
            config,
            env_mappings,
            duration,
            events,
            globals: Globals::new(HashMap::new()),
        }
    }

    fn activity(&self, name: &str) -> Result<&Activity, DrkError> {
        self.config
            .activities
            .get(name)
            .ok_or_else(|| DrkError::MissingActivity(name.to_string()))
    }

    /// Runs the `init` workflow (if present) to completion with a single VU
    /// before launching every other workflow concurrently.
    pub async fn run(&self) -> Result<(), DrkError> {
        if self.config.workflows.contains_key(INIT_WORKFLOW) {
            tracing::info!("running init workflow");
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.run_workflow_as_single_vu(INIT_WORKFLOW).await?;
        }
        tracing::info!("finished init workflow");

        let mut set = JoinSet::new();
        for name in self.config.workflows.keys() {
            if name == INIT_WORKFLOW {
                continue;
            }
            let name = name.clone();
            let runner = self.clone();
            set.spawn(async move { runner.run_workflow(&name).await });
        }

        while let Some(res) = set.join_next().await {
            res.map_err(|e| DrkError::Config(format!("workflow task panicked: {e}")))??;
        }

        Ok(())
    }

    /// `init` is run with a forced `vus = 1`, regardless of what the config
    /// declares — setup/migration workflows are not meant to be replayed
    /// concurrently.
    async fn run_workflow_as_single_vu(&self, name: &str) -> Result<(), DrkError> {
        let workflow = self
            .config
            .workflows
            .get(name)
            .ok_or_else(|| DrkError::MissingActivity(name.to_string()))?;
        self.run_vu(name, workflow).await
    }

    async fn run_workflow(&self, name: &str) -> Result<(), DrkError> {
        let workflow = self
            .config
            .workflows
            .get(name)
            .ok_or_else(|| DrkError::MissingActivity(name.to_string()))?;

        let spawn_delay = workflow
            .ramp_for
            .filter(|d| !d.is_zero() && workflow.vus > 0)
            .map(|ramp| ramp / workflow.vus);

        let mut set = JoinSet::new();
        for vu in 0..workflow.vus {
            if let (Some(delay), true) = (spawn_delay, vu > 0) {
                tokio::time::sleep(delay).await;
            }

            let name = name.to_string();
            let runner = self.clone();
            set.spawn(async move {
                let workflow = runner
                    .config
                    .workflows
                    .get(&name)
                    .expect("workflow looked up by a name already known to exist");
                runner.run_vu(&name, workflow).await
            });
        }

        while let Some(res) = set.join_next().await {
            res.map_err(|e| DrkError::Config(format!("vu task panicked: {e}")))??;
        }

        Ok(())
    }

    async fn run_vu(&self, workflow_name: &str, workflow: &Workflow) -> Result<(), DrkError> {
        if let Some(run_after) = workflow.run_after {
            tokio::time::sleep(run_after).await;
        }

        let vu = Vu::new(self.env_mappings.clone(), self.globals.clone());

        tracing::debug!(workflow = workflow_name, "running setup queries");
        for name in &workflow.setup_queries {
            let activity = self.activity(name)?;

            let (rows, taken, result) = if activity.batch.is_some() {
                self.run_batch(&vu, activity).await
            } else {
                self.run_query(&vu, activity).await
            };

            if let Err(err) = result {
                let _ = self
                    .events
                    .send(Event::err(workflow_name, name.as_str(), taken, &err))
                    .await;
                return Err(DrkError::SetupFailed {
                    activity: name.clone(),
                    source: Box::new(err),
                });
            }

            let _ = self
                .events
                .send(Event::ok(format!("*{workflow_name}"), name.as_str(), taken))
                .await;
            vu.apply(name, rows).await;
        }
        tracing::debug!(workflow = workflow_name, "finished setup queries");

        vu.stagger(&workflow.queries).await;

        let vu = Arc::new(vu);
        let deadline = Instant::now() + effective_run_for(workflow.run_for, self.duration);

        let mut set = JoinSet::new();
        for query in &workflow.queries {
            // Touch the activity map up front so a typo in the config fails
            // fast, before any ticker starts.
            self.activity(&query.name)?;

            let runner = self.clone();
            let vu = vu.clone();
            let workflow_name = workflow_name.to_string();
            let query_name = query.name.clone();
            let rate = query.rate;

            set.spawn(async move {
                runner.run_activity(&vu, &workflow_name, &query_name, rate, deadline).await;
            });
        }

        while set.join_next().await.is_some() {}

        Ok(())
    }

    async fn run_activity(
        &self,
        vu: &Vu,
        workflow_name: &str,
        query_name: &str,
        rate: Rate,
        deadline: Instant,
    ) {
        let mut ticker = tokio::time::interval(rate.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let activity = match self.activity(query_name) {
                        Ok(a) => a,
                        Err(_) => return,
                    };

                    let mut dependencies_met = true;
                    for arg in &activity.args {
                        if !arg.depends_met(vu).await {
                            dependencies_met = false;
                            break;
                        }
                    }
                    if !dependencies_met {
                        tracing::debug!(workflow = workflow_name, query = query_name, "dependencies not met");
                        continue;
                    }

                    let (rows, taken, result) = if activity.batch.is_some() {
                        self.run_batch(vu, activity).await
                    } else {
                        self.run_query(vu, activity).await
                    };

                    match result {
                        Ok(()) => {
                            let _ = self.events.send(Event::ok(workflow_name, query_name, taken)).await;
                            vu.apply(query_name, rows).await;
                        }
                        Err(err) => {
                            let _ = self.events.send(Event::err(workflow_name, query_name, taken, &err)).await;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(query = query_name, "received termination signal");
                    return;
                }
            }
        }
    }

    async fn run_batch(&self, vu: &Vu, activity: &Activity) -> (Vec<Row>, Duration, Result<(), DrkError>) {
        let batch = activity.batch.as_ref().expect("run_batch requires a batch activity");
        let start = Instant::now();
        let mut total_elapsed = Duration::ZERO;
        let mut results = Vec::new();

        let mut loaded = 0u64;
        while loaded < batch.total {
            let remaining = batch.total - loaded;
            let chunk = remaining.min(batch.size);

            let mut rows: Vec<Vec<Value>> = Vec::with_capacity(chunk as usize);
            for _ in 0..chunk {
                match vu.generate_args(&activity.args).await {
                    Ok(args) => rows.push(args),
                    Err(err) => return (results, start.elapsed(), Err(err)),
                }
            }

            tracing::info!(
                kind = ?activity.kind,
                total = batch.total,
                current = loaded + chunk,
                "loading batch"
            );

            let (taken, result) = self.db.load(vu, batch, &rows).await;
            total_elapsed += taken;
            if let Err(err) = result {
                return (results, total_elapsed, Err(err));
            }

            results.extend(dialect::extract_returning(&batch.columns, &batch.returning, &rows));
            loaded += chunk;
        }

        (results, total_elapsed, Ok(()))
    }

    async fn run_query(&self, vu: &Vu, activity: &Activity) -> (Vec<Row>, Duration, Result<(), DrkError>) {
        let start = Instant::now();
        let args = match vu.generate_args(&activity.args).await {
            Ok(args) => args,
            Err(err) => return (Vec::new(), start.elapsed(), Err(err)),
        };

        tracing::debug!(statement = %activity.statement, "running statement");

        match activity.kind {
            ActivityType::Query => self.db.query(&activity.statement, &args).await,
            ActivityType::Exec => {
                let (taken, result) = self.db.exec(&activity.statement, &args).await;
                (Vec::new(), taken, result)
            }
        }
    }
}

/// A zero `run_for` means "unset": fall back to the global run duration
/// rather than giving the workflow an immediate deadline.
fn effective_run_for(run_for: Option<Duration>, global_duration: Duration) -> Duration {
    run_for.filter(|d| !d.is_zero()).unwrap_or(global_duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_run_for_falls_back_to_global_duration() {
        let global = Duration::from_secs(600);
        assert_eq!(effective_run_for(Some(Duration::ZERO), global), global);
        assert_eq!(effective_run_for(None, global), global);
    }

    #[test]
    fn nonzero_run_for_overrides_global_duration() {
        let global = Duration::from_secs(600);
        let explicit = Duration::from_secs(30);
        assert_eq!(effective_run_for(Some(explicit), global), explicit);
    }
}
