//! Step-driven acceptance tests for the Kubernetes environment resource.
//!
//! A [`TestCase`] applies each [`TestStep`]'s configuration in order, runs
//! the step's checks against the resulting state and the remote API, then
//! destroys everything it created and runs the destroy check while the
//! final state is still available:
//!
//! ```text
//! apply(step 1) -> checks -> apply(step 2) -> checks -> ... -> destroy -> destroy check
//! ```

use azdo::{AzdoConfig, ClientError};
use provider::{
    verify_all_destroyed, verify_all_destroyed_with_poll, verify_exists, DestroyPoll, Plan,
    ProviderContext, ReadOutcome, ReconcileError, ResourceConfig, StateError, StateSnapshot,
    VerifyError, RESOURCE_TYPE,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const TEST_PROJECT_ENV: &str = "AZDO_TEST_PROJECT_ID";
pub const TEST_ENVIRONMENT_ENV: &str = "AZDO_TEST_ENVIRONMENT_ID";
pub const TEST_SERVICE_ENDPOINT_ENV: &str = "AZDO_TEST_SERVICE_ENDPOINT_ID";

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("{address}: attribute {key} expected {expected:?}, got {actual:?}")]
    AttributeMismatch {
        address: String,
        key: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("{address}: attribute {key} is not set")]
    AttributeNotSet { address: String, key: String },

    #[error("{address}: not found in state")]
    MissingResource { address: String },

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

#[derive(Error, Debug)]
pub enum AcceptanceError {
    #[error("Pre-check failed: {message}")]
    PreCheck { message: String },

    #[error("Step {step}: applying {address} failed: {source}")]
    Apply {
        step: usize,
        address: String,
        #[source]
        source: ReconcileError,
    },

    #[error("Step {step}: check failed: {source}")]
    Check {
        step: usize,
        #[source]
        source: CheckError,
    },

    #[error("Step {step}: after applying, the plan for {address} was not empty ({action})")]
    NonEmptyPlan {
        step: usize,
        address: String,
        action: &'static str,
    },

    #[error("Step {step}: {address} disappeared right after apply")]
    VanishedAfterApply { step: usize, address: String },

    #[error("Invalid state for {address}: {source}")]
    State {
        address: String,
        #[source]
        source: StateError,
    },

    #[error("Destroying {address} failed: {source}")]
    Destroy {
        address: String,
        #[source]
        source: ReconcileError,
    },

    #[error("Destroy check failed: {0}")]
    DestroyCheck(#[source] VerifyError),
}

pub type AcceptanceResult<T> = Result<T, AcceptanceError>;

/// A state assertion run after a step is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    AttrEquals {
        address: String,
        key: String,
        value: String,
    },
    AttrSet {
        address: String,
        key: String,
    },
    /// The resource exists remotely and carries this name.
    Exists {
        address: String,
        name: String,
    },
}

impl Check {
    pub fn attr_equals(
        address: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Check::AttrEquals {
            address: address.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn attr_set(address: impl Into<String>, key: impl Into<String>) -> Self {
        Check::AttrSet {
            address: address.into(),
            key: key.into(),
        }
    }

    pub fn exists(address: impl Into<String>, name: impl Into<String>) -> Self {
        Check::Exists {
            address: address.into(),
            name: name.into(),
        }
    }

    pub async fn run(
        &self,
        context: &ProviderContext,
        snapshot: &StateSnapshot,
    ) -> Result<(), CheckError> {
        match self {
            Check::AttrEquals {
                address,
                key,
                value,
            } => {
                let actual = attribute(snapshot, address, key)?;
                if actual.as_deref() != Some(value.as_str()) {
                    return Err(CheckError::AttributeMismatch {
                        address: address.clone(),
                        key: key.clone(),
                        expected: value.clone(),
                        actual,
                    });
                }
                Ok(())
            }
            Check::AttrSet { address, key } => match attribute(snapshot, address, key)? {
                Some(value) if !value.is_empty() => Ok(()),
                _ => Err(CheckError::AttributeNotSet {
                    address: address.clone(),
                    key: key.clone(),
                }),
            },
            Check::Exists { address, name } => {
                verify_exists(context.client(), snapshot, address, name).await?;
                Ok(())
            }
        }
    }
}

fn attribute(
    snapshot: &StateSnapshot,
    address: &str,
    key: &str,
) -> Result<Option<String>, CheckError> {
    let instance = snapshot
        .get(address)
        .ok_or_else(|| CheckError::MissingResource {
            address: address.to_string(),
        })?;
    Ok(instance.primary.attribute(key).map(str::to_string))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyCheck {
    Skip,
    AllDestroyed,
    /// For backends whose deletes take a while to become visible.
    AllDestroyedWithin(DestroyPoll),
}

#[derive(Debug, Clone, Default)]
pub struct TestStep {
    pub resources: Vec<(String, ResourceConfig)>,
    pub checks: Vec<Check>,
}

impl TestStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, address: impl Into<String>, config: ResourceConfig) -> Self {
        self.resources.push((address.into(), config));
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

/// What one step did, kept so callers can compare steps with each other.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: usize,
    pub plans: Vec<(String, Plan)>,
    pub snapshot: StateSnapshot,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub steps: Vec<TestStep>,
    pub destroy_check: DestroyCheck,
}

impl Default for TestCase {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            destroy_check: DestroyCheck::AllDestroyed,
        }
    }
}

impl TestCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn destroy_check(mut self, destroy_check: DestroyCheck) -> Self {
        self.destroy_check = destroy_check;
        self
    }

    /// Runs every step, then destroys whatever was created, even when a step
    /// failed. A step failure takes precedence over destroy failures.
    pub async fn run(&self, context: &ProviderContext) -> AcceptanceResult<Vec<StepOutcome>> {
        let mut snapshot = StateSnapshot::new();
        let mut outcomes = Vec::with_capacity(self.steps.len());

        let steps_result = self.run_steps(context, &mut snapshot, &mut outcomes).await;
        let destroy_result = self.destroy(context, &mut snapshot).await;

        match (steps_result, destroy_result) {
            (Err(err), Err(destroy_err)) => {
                error!("Cleanup after failed test also failed: {}", destroy_err);
                Err(err)
            }
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(outcomes),
        }
    }

    async fn run_steps(
        &self,
        context: &ProviderContext,
        snapshot: &mut StateSnapshot,
        outcomes: &mut Vec<StepOutcome>,
    ) -> AcceptanceResult<()> {
        let reconciler = context.reconciler();

        for (index, step) in self.steps.iter().enumerate() {
            let step_number = index + 1;
            info!("Applying step {}/{}", step_number, self.steps.len());

            // resources dropped from the configuration are destroyed
            for address in snapshot.addresses() {
                if step.resources.iter().all(|(a, _)| *a != address) {
                    destroy_address(context, snapshot, &address).await?;
                }
            }

            let mut plans = Vec::with_capacity(step.resources.len());
            for (address, config) in &step.resources {
                let prior = state_of(snapshot, address)?;
                let outcome = reconciler
                    .apply(prior.as_ref(), config)
                    .await
                    .map_err(|source| AcceptanceError::Apply {
                        step: step_number,
                        address: address.clone(),
                        source,
                    })?;
                debug!("{}: {}", address, outcome.plan.action());
                snapshot.set(address.clone(), &outcome.state);
                plans.push((address.clone(), outcome.plan));
            }

            for check in &step.checks {
                check
                    .run(context, snapshot)
                    .await
                    .map_err(|source| AcceptanceError::Check {
                        step: step_number,
                        source,
                    })?;
            }

            self.assert_plan_empty(context, snapshot, step, step_number)
                .await?;

            outcomes.push(StepOutcome {
                step: step_number,
                plans,
                snapshot: snapshot.clone(),
            });
        }

        Ok(())
    }

    /// Refreshes every resource of the step and fails if applying the same
    /// configuration again would change anything.
    async fn assert_plan_empty(
        &self,
        context: &ProviderContext,
        snapshot: &StateSnapshot,
        step: &TestStep,
        step_number: usize,
    ) -> AcceptanceResult<()> {
        let reconciler = context.reconciler();

        for (address, config) in &step.resources {
            let Some(state) = state_of(snapshot, address)? else {
                continue;
            };
            let refreshed = reconciler
                .read(&state.resource_ref())
                .await
                .map_err(|source| AcceptanceError::Apply {
                    step: step_number,
                    address: address.clone(),
                    source,
                })?;
            let ReadOutcome::Found(refreshed) = refreshed else {
                return Err(AcceptanceError::VanishedAfterApply {
                    step: step_number,
                    address: address.clone(),
                });
            };

            let plan = provider::schema::plan(Some(&refreshed), config);
            if plan != Plan::NoOp {
                return Err(AcceptanceError::NonEmptyPlan {
                    step: step_number,
                    address: address.clone(),
                    action: plan.action(),
                });
            }
        }

        Ok(())
    }

    async fn destroy(
        &self,
        context: &ProviderContext,
        snapshot: &mut StateSnapshot,
    ) -> AcceptanceResult<()> {
        // the destroy check needs the state as it was before destroy
        let before_destroy = snapshot.clone();

        // one failed delete must not leave the remaining resources behind
        let mut first_error = None;
        for address in snapshot.addresses() {
            if let Err(err) = destroy_address(context, snapshot, &address).await {
                error!("{}", err);
                first_error.get_or_insert(err);
            }
        }

        let checked = match self.destroy_check {
            DestroyCheck::Skip => Ok(()),
            DestroyCheck::AllDestroyed => verify_all_destroyed(context.client(), &before_destroy)
                .await
                .map_err(AcceptanceError::DestroyCheck),
            DestroyCheck::AllDestroyedWithin(poll) => {
                verify_all_destroyed_with_poll(context.client(), &before_destroy, poll)
                    .await
                    .map_err(AcceptanceError::DestroyCheck)
            }
        };

        match first_error {
            Some(err) => {
                if let Err(check_err) = checked {
                    warn!("Destroy check after a failed destroy: {}", check_err);
                }
                Err(err)
            }
            None => checked,
        }
    }
}

fn state_of(
    snapshot: &StateSnapshot,
    address: &str,
) -> AcceptanceResult<Option<provider::ResourceState>> {
    snapshot
        .state(address)
        .map_err(|source| AcceptanceError::State {
            address: address.to_string(),
            source,
        })
}

async fn destroy_address(
    context: &ProviderContext,
    snapshot: &mut StateSnapshot,
    address: &str,
) -> AcceptanceResult<()> {
    if let Some(state) = state_of(snapshot, address)? {
        context
            .reconciler()
            .delete(&state.resource_ref())
            .await
            .map_err(|source| AcceptanceError::Destroy {
                address: address.to_string(),
                source,
            })?;
    }
    snapshot.remove(address);
    Ok(())
}

/// Existing project, environment and Kubernetes service connection that live
/// acceptance tests attach their resources to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFixture {
    pub project_id: String,
    pub environment_id: i32,
    pub service_endpoint_id: Uuid,
}

impl LiveFixture {
    pub fn from_env() -> AcceptanceResult<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| AcceptanceError::PreCheck {
                message: format!("{} must be set for acceptance tests", name),
            })
        };

        let project_id = var(TEST_PROJECT_ENV)?;
        let raw_environment = var(TEST_ENVIRONMENT_ENV)?;
        let environment_id = raw_environment
            .parse()
            .map_err(|_| AcceptanceError::PreCheck {
                message: format!(
                    "{} must be an integer, got {:?}",
                    TEST_ENVIRONMENT_ENV, raw_environment
                ),
            })?;
        let raw_endpoint = var(TEST_SERVICE_ENDPOINT_ENV)?;
        let service_endpoint_id =
            Uuid::parse_str(&raw_endpoint).map_err(|_| AcceptanceError::PreCheck {
                message: format!(
                    "{} must be a UUID, got {:?}",
                    TEST_SERVICE_ENDPOINT_ENV, raw_endpoint
                ),
            })?;

        Ok(Self {
            project_id,
            environment_id,
            service_endpoint_id,
        })
    }

    pub fn config(&self, name: impl Into<String>) -> ResourceConfig {
        ResourceConfig::new(
            self.project_id.clone(),
            self.environment_id,
            self.service_endpoint_id,
            name,
        )
    }
}

/// Verifies the provider credentials and the fixture before any live test
/// touches the API.
pub fn pre_check() -> AcceptanceResult<(AzdoConfig, LiveFixture)> {
    let config = AzdoConfig::from_env().map_err(|err| match err {
        ClientError::InvalidConfig { message } => AcceptanceError::PreCheck { message },
        other => AcceptanceError::PreCheck {
            message: other.to_string(),
        },
    })?;
    let fixture = LiveFixture::from_env()?;
    Ok((config, fixture))
}

/// The create-then-rename lifecycle:
///
/// 1. apply creates the resource and its state attributes are set
/// 2. the resource can be read by ID and carries the first name
/// 3. apply renames it in place
/// 4. the resource can be read by ID and carries the second name
/// 5. destroy deletes it and it can no longer be read by ID
pub fn create_and_update_case(
    address: &str,
    fixture: &LiveFixture,
    first_name: &str,
    second_name: &str,
) -> TestCase {
    let step = |name: &str| {
        TestStep::new()
            .resource(address, fixture.config(name))
            .check(Check::attr_equals(address, "name", name))
            .check(Check::attr_set(address, "project_id"))
            .check(Check::attr_set(address, "environment_id"))
            .check(Check::attr_set(address, "service_endpoint_id"))
            .check(Check::exists(address, name))
    };

    TestCase::new()
        .step(step(first_name))
        .step(step(second_name))
        .destroy_check(DestroyCheck::AllDestroyed)
}

pub fn default_address() -> String {
    format!("{}.kubernetes", RESOURCE_TYPE)
}
