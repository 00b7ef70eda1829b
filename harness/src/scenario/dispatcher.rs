//! Weighted scenario dispatch
//!
//! One call to [`ScenarioDispatcher::run_iteration`] draws a scenario, runs
//! its request sequence and returns every outcome it produced. Failed calls
//! never abort the iteration: the outcome captures the failure and the
//! sequence either continues or stops where a later step needs the result.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::auth::CredentialCache;
use crate::backend::{
    ApiCall, ApiResponse, NewTask, Operation, Task, TaskBackend, TaskUpdate, exchange,
};

use super::catalogue::{Scenario, UpdateFallback};
use super::outcome::{ActorId, Expectation, OutcomeSink, OutcomeTags, RequestOutcome, SkipReason};
use super::rng::RandomSource;
use super::weights::WeightTable;

/// Tasks fetched by the update scenario before picking one
const UPDATE_LIST_LIMIT: u32 = 5;

/// Frontend may answer from cache
const FRONTEND_EXPECTATION: Expectation = Expectation::Status(&[200, 304]);

pub struct ScenarioDispatcher {
    table: WeightTable,
    backend: Arc<dyn TaskBackend>,
    credentials: Arc<CredentialCache>,
}

impl ScenarioDispatcher {
    pub fn new(
        table: WeightTable,
        backend: Arc<dyn TaskBackend>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            table,
            backend,
            credentials,
        }
    }

    pub fn table(&self) -> &WeightTable {
        &self.table
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Draw the scenario for the next iteration
    pub fn select(&self, rng: &mut RandomSource) -> Scenario {
        self.table.select(rng.unit())
    }

    /// Run one weighted iteration for `actor_id`
    pub async fn run_iteration(
        &self,
        actor_id: ActorId,
        iteration: u64,
        rng: &mut RandomSource,
    ) -> Vec<RequestOutcome> {
        let scenario = self.select(rng);
        self.run_scenario(scenario, actor_id, iteration, rng).await
    }

    /// Run a specific scenario, bypassing the weighted draw
    pub async fn run_scenario(
        &self,
        scenario: Scenario,
        actor_id: ActorId,
        iteration: u64,
        rng: &mut RandomSource,
    ) -> Vec<RequestOutcome> {
        self.run(scenario, actor_id, iteration, rng, None).await
    }

    /// Like [`run_scenario`](Self::run_scenario), handing each outcome to
    /// `sink` as soon as its call completes. An iteration cut short still
    /// leaves every finished call recorded.
    pub async fn run_scenario_into(
        &self,
        scenario: Scenario,
        actor_id: ActorId,
        iteration: u64,
        rng: &mut RandomSource,
        sink: &dyn OutcomeSink,
    ) -> Vec<RequestOutcome> {
        self.run(scenario, actor_id, iteration, rng, Some(sink)).await
    }

    async fn run(
        &self,
        scenario: Scenario,
        actor_id: ActorId,
        iteration: u64,
        rng: &mut RandomSource,
        sink: Option<&dyn OutcomeSink>,
    ) -> Vec<RequestOutcome> {
        let mut ctx = IterationContext {
            dispatcher: self,
            actor_id,
            iteration,
            scenario: scenario.name(),
            rng,
            sink,
            via_fallback: false,
            outcomes: Vec::new(),
        };

        match scenario {
            Scenario::Public => ctx.public().await,
            Scenario::Read => ctx.read().await,
            Scenario::CreateTask => ctx.create().await,
            Scenario::ListTasks => ctx.list().await,
            Scenario::UpdateTask { fallback } => ctx.update(fallback).await,
            Scenario::CompleteTask => ctx.complete().await,
            Scenario::TaskLifecycle => ctx.lifecycle().await,
            Scenario::HealthCheck => ctx.health().await,
            Scenario::Smoke => ctx.smoke().await,
        }

        debug!(
            actor_id = %actor_id,
            iteration,
            scenario = scenario.name(),
            requests = ctx.outcomes.iter().filter(|o| !o.is_skipped()).count(),
            "iteration finished"
        );
        ctx.outcomes
    }
}

/// Outcome list that forwards each entry to the sink as it is added
struct Recorder<'s> {
    sink: Option<&'s dyn OutcomeSink>,
    outcomes: &'s mut Vec<RequestOutcome>,
}

impl Extend<RequestOutcome> for Recorder<'_> {
    fn extend<I: IntoIterator<Item = RequestOutcome>>(&mut self, iter: I) {
        for outcome in iter {
            if let Some(sink) = self.sink {
                sink.record(&outcome);
            }
            self.outcomes.push(outcome);
        }
    }
}

/// State of one running iteration
struct IterationContext<'a> {
    dispatcher: &'a ScenarioDispatcher,
    actor_id: ActorId,
    iteration: u64,
    scenario: &'static str,
    rng: &'a mut RandomSource,
    sink: Option<&'a dyn OutcomeSink>,
    via_fallback: bool,
    outcomes: Vec<RequestOutcome>,
}

impl IterationContext<'_> {
    fn tags(&self, operation: Operation) -> OutcomeTags {
        OutcomeTags {
            via_fallback: self.via_fallback,
            ..OutcomeTags::new(self.scenario, self.actor_id, operation)
        }
    }

    fn recorder(&mut self) -> Recorder<'_> {
        Recorder {
            sink: self.sink,
            outcomes: &mut self.outcomes,
        }
    }

    fn push(&mut self, outcome: RequestOutcome) {
        self.recorder().extend([outcome]);
    }

    fn skip(&mut self, reason: SkipReason, operation: Operation) {
        trace!(actor_id = %self.actor_id, scenario = self.scenario, ?reason, "step skipped");
        let tags = self.tags(operation);
        self.push(RequestOutcome::skipped(reason, tags));
    }

    /// Token for authenticated steps; records a skipped `operation` when
    /// none can be acquired
    async fn token(&mut self, operation: Operation) -> Option<String> {
        let dispatcher = self.dispatcher;
        let (actor_id, scenario) = (self.actor_id, self.scenario);
        let token = dispatcher
            .credentials
            .get_token_recorded(actor_id, scenario, &mut self.recorder())
            .await;
        if token.is_none() {
            self.skip(SkipReason::NoCredential, operation);
        }
        token
    }

    /// Send a call and record its outcome.
    /// Returns the response only when its status met the expectation.
    async fn send(&mut self, call: ApiCall, expectation: Expectation) -> Option<ApiResponse> {
        let (outcome, response) = self.exchange(&call, expectation).await;
        self.push(outcome);
        response
    }

    /// Like [`send`](Self::send), parsing the body as `T`. A body that does
    /// not parse turns the outcome into a protocol violation.
    async fn send_json<T: DeserializeOwned>(
        &mut self,
        call: ApiCall,
        expectation: Expectation,
    ) -> Option<T> {
        let (outcome, response) = self.exchange(&call, expectation).await;
        let Some(response) = response else {
            self.push(outcome);
            return None;
        };
        match response.json::<T>() {
            Ok(value) => {
                self.push(outcome);
                Some(value)
            }
            Err(e) => {
                self.push(outcome.into_protocol_violation(format!("{}: {}", call.operation(), e)));
                None
            }
        }
    }

    async fn exchange(
        &mut self,
        call: &ApiCall,
        expectation: Expectation,
    ) -> (RequestOutcome, Option<ApiResponse>) {
        let exchange = exchange(self.dispatcher.backend.as_ref(), call).await;
        let outcome =
            RequestOutcome::from_exchange(&exchange, expectation, self.tags(call.operation()));

        if call.token().is_some() && outcome.status() == Some(401) {
            self.dispatcher.credentials.invalidate(self.actor_id);
        }

        let response = if outcome.succeeded() {
            exchange.result.ok()
        } else {
            None
        };
        (outcome, response)
    }

    /// Public GET where anything but a 5xx passes
    async fn public_get(&mut self, call: ApiCall) {
        let is_metrics = matches!(call, ApiCall::Metrics);
        let (outcome, response) = self.exchange(&call, Expectation::NotServerError).await;
        let outcome = match response {
            Some(response) if is_metrics && response.status == 200 && response.body.trim().is_empty() => {
                outcome.into_protocol_violation("metrics: empty body")
            }
            _ => outcome,
        };
        self.push(outcome);
    }

    fn new_task(&self) -> NewTask {
        NewTask {
            title: format!("Load test task {}-{}", self.actor_id, self.iteration),
            description: Some(format!(
                "Created by actor {} in {} iteration {}",
                self.actor_id, self.scenario, self.iteration
            )),
        }
    }

    async fn create_task(&mut self, token: &str) -> Option<Task> {
        let task = self.new_task();
        self.send_json(
            ApiCall::CreateTask {
                token: token.to_string(),
                task,
            },
            Expectation::OK,
        )
        .await
    }

    async fn update_task(&mut self, token: &str, task: &Task) {
        let update = TaskUpdate {
            title: Some(format!("{} (updated)", task.title)),
            description: None,
            completed: Some(!task.completed),
        };
        self.send_json::<Task>(
            ApiCall::UpdateTask {
                token: token.to_string(),
                id: task.id,
                update,
            },
            Expectation::OK,
        )
        .await;
    }

    async fn public(&mut self) {
        let call = match self.rng.index(3) {
            0 => ApiCall::Root,
            1 => ApiCall::Health,
            _ => ApiCall::Metrics,
        };
        self.public_get(call).await;
    }

    async fn read(&mut self) {
        let call = match self.rng.index(3) {
            0 => ApiCall::Root,
            1 => ApiCall::Health,
            _ => ApiCall::Frontend,
        };
        self.public_get(call).await;
    }

    async fn create(&mut self) {
        let Some(token) = self.token(Operation::CreateTask).await else {
            return;
        };
        self.create_task(&token).await;
    }

    async fn list(&mut self) {
        let Some(token) = self.token(Operation::ListTasks).await else {
            return;
        };
        self.send_json::<Vec<Task>>(ApiCall::ListTasks { token, limit: None }, Expectation::OK)
            .await;
    }

    async fn update(&mut self, fallback: UpdateFallback) {
        let Some(token) = self.token(Operation::ListTasks).await else {
            return;
        };
        let Some(tasks) = self
            .send_json::<Vec<Task>>(
                ApiCall::ListTasks {
                    token: token.clone(),
                    limit: Some(UPDATE_LIST_LIMIT),
                },
                Expectation::OK,
            )
            .await
        else {
            return;
        };

        if tasks.is_empty() {
            match fallback {
                UpdateFallback::CreateInstead => {
                    self.via_fallback = true;
                    self.create_task(&token).await;
                }
                UpdateFallback::Skip => self.skip(SkipReason::NoExistingTask, Operation::UpdateTask),
            }
            return;
        }

        let task = &tasks[self.rng.index(tasks.len())];
        self.update_task(&token, task).await;
    }

    async fn complete(&mut self) {
        let Some(token) = self.token(Operation::CreateTask).await else {
            return;
        };
        let Some(task) = self.create_task(&token).await else {
            self.skip(SkipReason::MissingPrerequisite, Operation::CompleteTask);
            return;
        };
        self.send(
            ApiCall::CompleteTask { token, id: task.id },
            Expectation::OK,
        )
        .await;
    }

    async fn lifecycle(&mut self) {
        let Some(token) = self.token(Operation::CreateTask).await else {
            return;
        };
        let Some(task) = self.create_task(&token).await else {
            self.skip(SkipReason::MissingPrerequisite, Operation::CompleteTask);
            self.skip(SkipReason::MissingPrerequisite, Operation::DeleteTask);
            return;
        };
        self.send(
            ApiCall::CompleteTask {
                token: token.clone(),
                id: task.id,
            },
            Expectation::OK,
        )
        .await;
        // Delete regardless so the lifecycle leaves nothing behind
        self.send(ApiCall::DeleteTask { token, id: task.id }, Expectation::OK)
            .await;
    }

    async fn health(&mut self) {
        self.send(ApiCall::Health, Expectation::OK).await;
    }

    async fn smoke(&mut self) {
        self.send(ApiCall::Frontend, FRONTEND_EXPECTATION).await;
        self.send_json::<serde_json::Value>(ApiCall::Root, Expectation::OK)
            .await;

        if let Some(token) = self.token(Operation::CreateTask).await {
            let created = self.create_task(&token).await;
            self.send_json::<Vec<Task>>(
                ApiCall::ListTasks {
                    token: token.clone(),
                    limit: None,
                },
                Expectation::OK,
            )
            .await;
            match created {
                Some(task) => self.update_task(&token, &task).await,
                None => self.skip(SkipReason::MissingPrerequisite, Operation::UpdateTask),
            }
        }

        self.health().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialConfig;
    use crate::scenario::OutcomeKind;
    use crate::stats::{AUTH_ACQUISITIONS, HTTP_REQS, MetricsAggregator, TASKS_DELETED};
    use crate::test_utils::{MockBackend, Override};

    fn dispatcher_for(
        backend: Arc<MockBackend>,
        scenario: Scenario,
    ) -> (ScenarioDispatcher, Arc<CredentialCache>) {
        let credentials = Arc::new(CredentialCache::new(
            backend.clone(),
            CredentialConfig::default(),
        ));
        let table = WeightTable::new(vec![(scenario, 1.0)]).unwrap();
        (
            ScenarioDispatcher::new(table, backend, credentials.clone()),
            credentials,
        )
    }

    fn operations(outcomes: &[RequestOutcome]) -> Vec<Operation> {
        outcomes.iter().map(|o| o.tags.operation).collect()
    }

    #[tokio::test]
    async fn test_create_scenario_authenticates_then_posts() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::CreateTask);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(
            operations(&outcomes),
            vec![Operation::Register, Operation::CreateTask]
        );
        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert!(outcomes.iter().all(|o| o.tags.scenario == "create"));
        assert!(outcomes.iter().all(|o| o.tags.actor_id == ActorId(1)));
        assert_eq!(backend.task_count(), 1);
    }

    #[tokio::test]
    async fn test_second_iteration_reuses_token() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::ListTasks);
        let mut rng = RandomSource::seeded(1);

        dispatcher.run_iteration(ActorId(2), 0, &mut rng).await;
        let outcomes = dispatcher.run_iteration(ActorId(2), 1, &mut rng).await;

        assert_eq!(operations(&outcomes), vec![Operation::ListTasks]);
        assert_eq!(backend.calls(Operation::Register), 1);
    }

    #[tokio::test]
    async fn test_update_falls_back_to_create_on_empty_list() {
        let backend = Arc::new(MockBackend::new());
        let scenario = Scenario::UpdateTask {
            fallback: UpdateFallback::CreateInstead,
        };
        let (dispatcher, _) = dispatcher_for(backend.clone(), scenario);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(
            operations(&outcomes),
            vec![Operation::Register, Operation::ListTasks, Operation::CreateTask]
        );
        let create = &outcomes[2];
        assert!(create.succeeded());
        assert!(create.tags.via_fallback);
        assert!(!outcomes[1].tags.via_fallback);
        assert_eq!(backend.calls(Operation::UpdateTask), 0);
    }

    #[tokio::test]
    async fn test_update_skip_policy_records_skipped_step() {
        let backend = Arc::new(MockBackend::new());
        let scenario = Scenario::UpdateTask {
            fallback: UpdateFallback::Skip,
        };
        let (dispatcher, _) = dispatcher_for(backend.clone(), scenario);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        let last = outcomes.last().unwrap();
        assert_eq!(last.kind, OutcomeKind::Skipped(SkipReason::NoExistingTask));
        assert_eq!(last.tags.operation, Operation::UpdateTask);
        assert_eq!(backend.calls(Operation::CreateTask), 0);
    }

    #[tokio::test]
    async fn test_update_toggles_listed_task() {
        let backend = Arc::new(MockBackend::new().with_tasks(3));
        let scenario = Scenario::UpdateTask {
            fallback: UpdateFallback::CreateInstead,
        };
        let (dispatcher, _) = dispatcher_for(backend.clone(), scenario);
        let mut rng = RandomSource::seeded(9);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(
            operations(&outcomes),
            vec![Operation::Register, Operation::ListTasks, Operation::UpdateTask]
        );
        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert_eq!(backend.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_skips_authenticated_work() {
        let backend = Arc::new(MockBackend::new());
        backend.respond(Operation::Register, Override::Status(500));
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::CreateTask);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_server_error());
        assert_eq!(
            outcomes[1].kind,
            OutcomeKind::Skipped(SkipReason::NoCredential)
        );
        assert_eq!(backend.calls(Operation::CreateTask), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_response_invalidates_token() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, credentials) = dispatcher_for(backend.clone(), Scenario::ListTasks);
        let mut rng = RandomSource::seeded(1);

        dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;
        assert!(credentials.session(ActorId(1)).is_some());

        backend.respond(Operation::ListTasks, Override::Status(401));
        let outcomes = dispatcher.run_iteration(ActorId(1), 1, &mut rng).await;

        assert!(!outcomes[0].succeeded());
        assert!(credentials.session(ActorId(1)).is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_stops_after_failed_create() {
        let backend = Arc::new(MockBackend::new());
        backend.respond(Operation::CreateTask, Override::Status(503));
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::TaskLifecycle);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        let skipped: Vec<_> = outcomes.iter().filter(|o| o.is_skipped()).collect();
        assert_eq!(skipped.len(), 2);
        assert_eq!(backend.calls(Operation::CompleteTask), 0);
        assert_eq!(backend.calls(Operation::DeleteTask), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_cleans_up() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::TaskLifecycle);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(
            operations(&outcomes),
            vec![
                Operation::Register,
                Operation::CreateTask,
                Operation::CompleteTask,
                Operation::DeleteTask
            ]
        );
        assert!(outcomes.iter().all(|o| o.succeeded()));
        assert_eq!(backend.task_count(), 0);
    }

    #[tokio::test]
    async fn test_smoke_continues_to_health_without_credentials() {
        let backend = Arc::new(MockBackend::new());
        backend.respond(Operation::Register, Override::Status(500));
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::Smoke);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(outcomes.last().unwrap().tags.operation, Operation::Health);
        assert_eq!(backend.calls(Operation::Health), 1);
        assert_eq!(backend.calls(Operation::ListTasks), 0);
    }

    #[tokio::test]
    async fn test_smoke_full_flow() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::Smoke);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert_eq!(
            operations(&outcomes),
            vec![
                Operation::Frontend,
                Operation::Root,
                Operation::Register,
                Operation::CreateTask,
                Operation::ListTasks,
                Operation::UpdateTask,
                Operation::Health
            ]
        );
        assert!(outcomes.iter().all(|o| o.succeeded()));
    }

    #[tokio::test]
    async fn test_smoke_root_must_be_json() {
        let backend = Arc::new(MockBackend::new());
        backend.respond(Operation::Root, Override::Body(200, "welcome".to_string()));
        let (dispatcher, _) = dispatcher_for(backend, Scenario::Smoke);
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher.run_iteration(ActorId(1), 0, &mut rng).await;

        assert!(matches!(
            outcomes[1].kind,
            OutcomeKind::ProtocolViolation { status: 200, .. }
        ));
    }

    #[tokio::test]
    async fn test_public_metrics_needs_a_body() {
        let backend = Arc::new(MockBackend::new());
        backend.respond(Operation::Metrics, Override::Body(200, String::new()));
        let (dispatcher, _) = dispatcher_for(backend.clone(), Scenario::Public);

        // Draw until the metrics endpoint comes up
        let mut rng = RandomSource::seeded(3);
        let mut violation = None;
        for iteration in 0..64 {
            let outcomes = dispatcher.run_iteration(ActorId(1), iteration, &mut rng).await;
            assert_eq!(outcomes.len(), 1);
            if outcomes[0].tags.operation == Operation::Metrics {
                violation = Some(outcomes[0].clone());
                break;
            }
        }

        let outcome = violation.unwrap();
        assert!(matches!(outcome.kind, OutcomeKind::ProtocolViolation { .. }));
        assert_eq!(backend.calls(Operation::Register), 0);
    }

    #[tokio::test]
    async fn test_sink_receives_every_outcome() {
        let backend = Arc::new(MockBackend::new());
        let (dispatcher, _) = dispatcher_for(backend, Scenario::TaskLifecycle);
        let aggregator = MetricsAggregator::new();
        let mut rng = RandomSource::seeded(1);

        let outcomes = dispatcher
            .run_scenario_into(Scenario::TaskLifecycle, ActorId(1), 0, &mut rng, &aggregator)
            .await;

        let snapshot = aggregator.snapshot();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(snapshot.counter(HTTP_REQS), 4);
        assert_eq!(snapshot.counter(AUTH_ACQUISITIONS), 1);
        assert_eq!(snapshot.counter(TASKS_DELETED), 1);
    }

    #[tokio::test]
    async fn test_public_tolerates_client_errors() {
        let backend = Arc::new(MockBackend::new());
        for operation in [Operation::Root, Operation::Health, Operation::Frontend] {
            backend.respond(operation, Override::Status(404));
        }
        let (dispatcher, _) = dispatcher_for(backend, Scenario::Read);
        let mut rng = RandomSource::seeded(5);

        for iteration in 0..10 {
            let outcomes = dispatcher.run_iteration(ActorId(1), iteration, &mut rng).await;
            assert!(outcomes[0].succeeded());
        }
    }
}
