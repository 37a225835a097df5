/*!
 * Provider rotation with per-provider retries.
 *
 * The rotation is a small pure state machine: it decides which provider to
 * try next from the outcome of the previous attempt. The async driver
 * [`run_rotation`] performs the attempts and feeds outcomes back in.
 *
 * With `P` providers and `R` retries per provider, at most `P * R` attempts
 * are made, in the order p1 x R, p2 x R, and so on.
 */

use log::{error, info, warn};
use std::future::Future;

use crate::errors::{FailureKind, ProviderError, TranslationError};
use crate::translation::stop::StopFlag;

/// Ordered providers and how many times to try each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
    /// `None` stands for an endpoint without routing (custom endpoint)
    providers: Vec<Option<String>>,
    retries_per_provider: u32,
}

impl RotationPlan {
    pub fn new(providers: Vec<Option<String>>, retries_per_provider: u32) -> Self {
        Self {
            providers,
            retries_per_provider,
        }
    }

    /// Rotation over named OpenRouter providers
    pub fn routed<I, S>(providers: I, retries_per_provider: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(providers.into_iter().map(|p| Some(p.into())).collect(), retries_per_provider)
    }

    /// A single unrouted endpoint
    pub fn single_endpoint(retries: u32) -> Self {
        Self::new(vec![None], retries)
    }

    pub fn providers(&self) -> &[Option<String>] {
        &self.providers
    }

    pub fn retries_per_provider(&self) -> u32 {
        self.retries_per_provider
    }

    pub fn max_attempts(&self) -> usize {
        self.providers.len() * self.retries_per_provider as usize
    }
}

/// Which provider and retry an attempt targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTarget {
    pub provider_index: usize,
    pub provider: Option<String>,
    /// 0-based retry number for this provider
    pub retry: u32,
}

impl AttemptTarget {
    pub fn label(&self) -> &str {
        self.provider.as_deref().unwrap_or("custom endpoint")
    }
}

/// Why the machine issued an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptReason {
    First,
    Retry,
    NextProvider,
}

/// Result of one attempt as seen by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(FailureKind),
}

/// Next step decided by the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Attempt { target: AttemptTarget, reason: AttemptReason },
    Success,
    Exhausted { attempts: usize },
    Cancelled { attempts: usize },
}

/// Rotation state machine
#[derive(Debug, Clone)]
pub struct RotationMachine {
    plan: RotationPlan,
    provider_index: usize,
    retry: u32,
    attempts: usize,
    started: bool,
}

impl RotationMachine {
    pub fn new(plan: RotationPlan) -> Self {
        Self {
            plan,
            provider_index: 0,
            retry: 0,
            attempts: 0,
            started: false,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn attempt(&mut self, reason: AttemptReason, cancelled: bool) -> Transition {
        if cancelled {
            return Transition::Cancelled { attempts: self.attempts };
        }
        self.attempts += 1;
        Transition::Attempt {
            target: AttemptTarget {
                provider_index: self.provider_index,
                provider: self.plan.providers[self.provider_index].clone(),
                retry: self.retry,
            },
            reason,
        }
    }

    /// Advance the machine. Pass `None` to start, then the outcome of each
    /// attempt. `cancelled` is consulted before every new attempt.
    pub fn next(&mut self, last: Option<AttemptOutcome>, cancelled: bool) -> Transition {
        match last {
            Some(AttemptOutcome::Success) => Transition::Success,
            None if !self.started => {
                self.started = true;
                if self.plan.max_attempts() == 0 {
                    return Transition::Exhausted { attempts: 0 };
                }
                self.attempt(AttemptReason::First, cancelled)
            }
            None => Transition::Exhausted { attempts: self.attempts },
            Some(AttemptOutcome::Failed(_)) => {
                if self.retry + 1 < self.plan.retries_per_provider {
                    self.retry += 1;
                    self.attempt(AttemptReason::Retry, cancelled)
                } else if self.provider_index + 1 < self.plan.providers.len() {
                    self.provider_index += 1;
                    self.retry = 0;
                    self.attempt(AttemptReason::NextProvider, cancelled)
                } else {
                    Transition::Exhausted { attempts: self.attempts }
                }
            }
        }
    }
}

/// Record of one attempt made by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub target: AttemptTarget,
    pub outcome: AttemptOutcome,
}

/// What the driver produced along with its attempt history
#[derive(Debug)]
pub struct RotationRun<T> {
    pub result: Result<T, TranslationError>,
    pub history: Vec<ProviderAttempt>,
}

/// Drive the rotation, calling `attempt` for each target until one succeeds,
/// the plan is exhausted or `stop` is raised.
pub async fn run_rotation<T, F, Fut>(plan: &RotationPlan, stop: &StopFlag, mut attempt: F) -> RotationRun<T>
where
    F: FnMut(AttemptTarget) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut machine = RotationMachine::new(plan.clone());
    let mut history = Vec::new();
    let mut last = None;
    let mut found = None;

    loop {
        match machine.next(last, stop.is_stopped()) {
            Transition::Attempt { target, reason } => {
                match reason {
                    AttemptReason::NextProvider => info!("Switching to provider {}", target.label()),
                    AttemptReason::Retry | AttemptReason::First => {}
                }
                info!(
                    "Attempt {}/{} with {}",
                    target.retry + 1,
                    plan.retries_per_provider(),
                    target.label()
                );

                match attempt(target.clone()).await {
                    Ok(value) => {
                        info!("Got a usable response from {}", target.label());
                        history.push(ProviderAttempt {
                            target,
                            outcome: AttemptOutcome::Success,
                        });
                        found = Some(value);
                        last = Some(AttemptOutcome::Success);
                    }
                    Err(e) => {
                        let kind = e.kind();
                        match kind {
                            FailureKind::Transport => warn!("Transport failure from {}: {}", target.label(), e),
                            FailureKind::MalformedResponse => {
                                warn!("Malformed response from {}: {}", target.label(), e)
                            }
                            FailureKind::Cancelled => info!("Attempt on {} cancelled", target.label()),
                        }
                        history.push(ProviderAttempt {
                            target,
                            outcome: AttemptOutcome::Failed(kind),
                        });
                        last = Some(AttemptOutcome::Failed(kind));
                    }
                }
            }
            Transition::Success => {
                let result = found.take().ok_or(TranslationError::Exhausted {
                    attempts: machine.attempts(),
                });
                return RotationRun { result, history };
            }
            Transition::Exhausted { attempts } => {
                error!("All providers failed after {} attempts", attempts);
                return RotationRun {
                    result: Err(TranslationError::Exhausted { attempts }),
                    history,
                };
            }
            Transition::Cancelled { attempts } => {
                info!("Rotation stopped after {} attempts", attempts);
                return RotationRun {
                    result: Err(TranslationError::Cancelled),
                    history,
                };
            }
        }
    }
}
