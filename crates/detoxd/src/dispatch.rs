//! Command dispatch: IPC commands in, engine calls, responses out

use detox_api::{
    Command, ErrorCode, ErrorInfo, EventPayload, HealthStatus, ProcessView, Response,
    ResponsePayload,
};
use detox_core::{CoreError, CoreEvent, EngineHandle, ValidationError};
use detox_host_api::ProcessController;
use detox_store::{AuditLog, SnapshotStore};
use detox_util::{ClientId, Clock, is_mock_time_active};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything a command handler may touch
pub struct Dispatcher {
    engine: EngineHandle,
    process: Arc<dyn ProcessController>,
    snapshots: Arc<dyn SnapshotStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        engine: EngineHandle,
        process: Arc<dyn ProcessController>,
        snapshots: Arc<dyn SnapshotStore>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            process,
            snapshots,
            audit,
            clock,
            call_timeout,
        }
    }

    pub async fn handle(
        &self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        if command.is_mutation() {
            info!(client_id = %client_id, request_id, ?command, "Mutating command");
        } else {
            debug!(client_id = %client_id, request_id, ?command, "Dispatching command");
        }

        match command {
            Command::GetState => match self.engine.snapshot().await {
                Ok(state) => Response::success(request_id, ResponsePayload::State(state)),
                Err(e) => error_response(request_id, e),
            },

            Command::BlockApp { name, duration } => {
                match self.engine.request_app_block(name.as_str(), duration).await {
                    Ok(block) => {
                        Response::success(request_id, ResponsePayload::AppBlocked { block })
                    }
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::BlockInternet { duration } => {
                match self.engine.request_internet_block(duration).await {
                    Ok(block) => {
                        Response::success(request_id, ResponsePayload::InternetBlocked { block })
                    }
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::ExtendInternet { duration } => {
                match self.engine.extend_internet_block(duration).await {
                    Ok(block) => {
                        Response::success(request_id, ResponsePayload::InternetBlocked { block })
                    }
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::AddRoutine { routine } => {
                match self.engine.request_routine_block(routine).await {
                    Ok(routine) => {
                        Response::success(request_id, ResponsePayload::RoutineAdded { routine })
                    }
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::RemoveRoutine { routine_id } => {
                match self.engine.remove_routine_block(routine_id).await {
                    Ok(routine) => Response::success(
                        request_id,
                        ResponsePayload::RoutineRemoved {
                            routine_id: routine.routine_id,
                        },
                    ),
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::RequestUnblock { target } => {
                match self.engine.request_unblock(target).await {
                    Ok(outcome) => {
                        Response::success(request_id, ResponsePayload::Unblock { outcome })
                    }
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::CancelUnblock { target } => match self.engine.cancel_unblock(target).await {
                Ok(targets) => {
                    Response::success(request_id, ResponsePayload::UnblockCancelled { targets })
                }
                Err(e) => error_response(request_id, e),
            },

            Command::SetCoolingPeriod { duration } => {
                match self.engine.set_cooling_period(duration).await {
                    Ok(cooling_period) => Response::success(
                        request_id,
                        ResponsePayload::CoolingPeriodSet { cooling_period },
                    ),
                    Err(e) => error_response(request_id, e),
                }
            }

            Command::ListProcesses => self.list_processes(request_id).await,

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let health = self.health().await;
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }

    async fn list_processes(&self, request_id: u64) -> Response {
        let observed_at = self.clock.now();
        match tokio::time::timeout(self.call_timeout, self.process.list_processes()).await {
            Ok(Ok(processes)) => {
                let mut views: Vec<ProcessView> = processes
                    .into_iter()
                    .map(|p| ProcessView {
                        pid: p.pid,
                        name: p.name,
                    })
                    .collect();
                views.sort_by(|a, b| a.name.cmp(&b.name).then(a.pid.cmp(&b.pid)));

                Response::success(
                    request_id,
                    ResponsePayload::Processes {
                        processes: views,
                        observed_at,
                    },
                )
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Process listing failed");
                Response::error(request_id, ErrorInfo::new(ErrorCode::HostError, e.to_string()))
            }
            Err(_) => Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::HostError, "Process listing timed out"),
            ),
        }
    }

    async fn health(&self) -> HealthStatus {
        let process_controller_ok = matches!(
            tokio::time::timeout(self.call_timeout, self.process.list_processes()).await,
            Ok(Ok(_))
        );

        HealthStatus {
            live: true,
            ready: self.engine.snapshot().await.is_ok(),
            store_ok: self.snapshots.is_healthy() && self.audit.is_healthy(),
            process_controller_ok,
            mock_time: is_mock_time_active(),
        }
    }
}

fn error_response(request_id: u64, error: CoreError) -> Response {
    let code = match &error {
        CoreError::Validation(ValidationError::UnknownRoutine(_)) => ErrorCode::NotFound,
        CoreError::Validation(_) => ErrorCode::ValidationFailed,
        CoreError::EngineUnavailable => ErrorCode::InternalError,
    };
    Response::error(request_id, ErrorInfo::new(code, error.to_string()))
}

/// Wire form of a core event
pub fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::AppBlocked { name, until } => EventPayload::AppBlocked { name, until },
        CoreEvent::InternetBlocked { until } => EventPayload::InternetBlocked { until },
        CoreEvent::RoutineAdded { routine_id } => EventPayload::RoutineAdded { routine_id },
        CoreEvent::RoutineRemoved { routine_id } => EventPayload::RoutineRemoved { routine_id },
        CoreEvent::UnblockCountdownStarted { countdown } => {
            EventPayload::UnblockCountdownStarted { countdown }
        }
        CoreEvent::UnblockCancelled { target } => EventPayload::UnblockCancelled { target },
        CoreEvent::UnblockCommitted { target } => EventPayload::UnblockCommitted { target },
        CoreEvent::CoolingPeriodChanged { cooling_period } => {
            EventPayload::CoolingPeriodChanged { cooling_period }
        }
        CoreEvent::EnforcementStarted { name, until } => {
            EventPayload::EnforcementStarted { name, until }
        }
        CoreEvent::EnforcementStopped { name } => EventPayload::EnforcementStopped { name },
        CoreEvent::NetworkEnforcement { blocked } => EventPayload::NetworkEnforcement { blocked },
    }
}

/// Whether subscribers should also get a fresh state snapshot after `event`
pub fn refreshes_state(event: &CoreEvent) -> bool {
    event.changes_registry()
        || matches!(
            event,
            CoreEvent::UnblockCountdownStarted { .. } | CoreEvent::UnblockCancelled { .. }
        )
}
