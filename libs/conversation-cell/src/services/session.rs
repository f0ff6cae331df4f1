use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use availability_cell::{AvailabilityError, SlotCalculator};
use scheduling_cell::{
    BookAppointmentRequest, BookingConflictResolver, SchedulingError,
};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_database::with_read_retry;

use crate::models::{
    AdvanceOutcome, ConversationError, ConversationSession, ConversationStep, OfferedSlots,
    SessionContext, SessionState, SessionStatus, StartSessionRequest, StepInput,
};
use crate::services::events::{BookingEventKind, EventEmitter};
use crate::services::state_machine::{is_expired, validate_date_choice, validate_slot_selection};

/// Drives a client through the booking steps. State lives entirely in
/// storage, so any worker can service any session; the transport layer
/// guarantees at most one in-flight turn per session.
pub struct SessionService {
    supabase: Arc<SupabaseClient>,
    calculator: SlotCalculator,
    resolver: BookingConflictResolver,
    events: EventEmitter,
    session_timeout: Duration,
    context_cap: usize,
    slot_duration_minutes: i32,
}

impl SessionService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            calculator: SlotCalculator::with_client(Arc::clone(&supabase)),
            resolver: BookingConflictResolver::with_client(Arc::clone(&supabase)),
            events: EventEmitter::new(Arc::clone(&supabase)),
            session_timeout: Duration::hours(config.session_timeout_hours),
            context_cap: config.max_session_context_bytes,
            slot_duration_minutes: config.default_slot_duration_minutes,
            supabase,
        }
    }

    /// Open a session for either entry channel. The welcome step needs no
    /// input, so the stored state moves straight to date selection and the
    /// returned prompt asks for a date.
    #[instrument(skip(self, auth_token), fields(channel = %request.channel_identity))]
    pub async fn start_session(
        &self,
        request: StartSessionRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<AdvanceOutcome, ConversationError> {
        let session_id = Uuid::new_v4();

        let session_row = json!({
            "id": session_id,
            "client_id": request.client_id,
            "practitioner_id": request.practitioner_id,
            "channel_identity": request.channel_identity,
            "status": SessionStatus::Active.to_string(),
            "entry_method": request.entry_method.to_string(),
            "started_at": now.to_rfc3339(),
            "ended_at": null
        });
        self.insert_row("/rest/v1/conversation_sessions", session_row, auth_token)
            .await?;

        let state_row = json!({
            "session_id": session_id,
            "current_step": ConversationStep::DateSelection,
            "context": SessionContext::default(),
            "last_updated": now.to_rfc3339()
        });
        self.insert_row("/rest/v1/session_states", state_row, auth_token)
            .await?;

        self.events
            .emit(BookingEventKind::SessionStarted, session_id, request.entry_method);
        info!("Session {} started via {}", session_id, request.entry_method);

        Ok(AdvanceOutcome {
            session_id,
            session_status: SessionStatus::Active,
            current_step: ConversationStep::DateSelection,
            prompt: prompt_date("Which date would you like to book?"),
            terminal: false,
        })
    }

    /// Apply one turn of input. Terminal sessions answer idempotently; an
    /// idle session past the inactivity window expires here without
    /// consuming the input.
    #[instrument(skip(self, input, auth_token))]
    pub async fn advance(
        &self,
        session_id: Uuid,
        input: StepInput,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<AdvanceOutcome, ConversationError> {
        let (session, mut state) = self.load(session_id, auth_token).await?;

        if session.status.is_terminal() {
            return Ok(terminal_outcome(&session, &state));
        }

        if is_expired(state.last_updated, now, self.session_timeout) {
            return self.expire(&session, &state, auth_token).await;
        }

        let outcome = match state.current_step {
            ConversationStep::Welcome => {
                // No input required; any payload moves the flow forward.
                state.current_step = ConversationStep::DateSelection;
                AdvanceOutcome {
                    session_id,
                    session_status: SessionStatus::Active,
                    current_step: ConversationStep::DateSelection,
                    prompt: prompt_date("Which date would you like to book?"),
                    terminal: false,
                }
            }

            ConversationStep::DateSelection => {
                let StepInput::Date { date } = input else {
                    return Err(ConversationError::InvalidInput(
                        "expected a date selection".to_string(),
                    ));
                };
                validate_date_choice(date, now.date_naive())?;

                state.context.selected_date = Some(date);
                let slots = self
                    .compute_slots_for(&session, date, now, auth_token)
                    .await?;

                if slots.is_empty() {
                    // Stay here; the client rebinds to another date.
                    AdvanceOutcome {
                        session_id,
                        session_status: SessionStatus::Active,
                        current_step: ConversationStep::DateSelection,
                        prompt: prompt_date(&format!(
                            "No slots are available on {}. Please pick another date.",
                            date
                        )),
                        terminal: false,
                    }
                } else {
                    let offered = OfferedSlots { date, slots };
                    let prompt = prompt_slots(&offered, "Pick one of the available times.");
                    state.context.offered = Some(offered);
                    state.current_step = ConversationStep::TimeSelection;
                    AdvanceOutcome {
                        session_id,
                        session_status: SessionStatus::Active,
                        current_step: ConversationStep::TimeSelection,
                        prompt,
                        terminal: false,
                    }
                }
            }

            ConversationStep::TimeSelection => {
                let StepInput::Slot { index } = input else {
                    return Err(ConversationError::InvalidInput(
                        "expected a slot selection".to_string(),
                    ));
                };
                let slot = validate_slot_selection(&state.context, index)?;
                let prompt = prompt_confirmation(&slot);
                state.context.selected_slot = Some(slot);
                state.current_step = ConversationStep::Confirmation;
                AdvanceOutcome {
                    session_id,
                    session_status: SessionStatus::Active,
                    current_step: ConversationStep::Confirmation,
                    prompt,
                    terminal: false,
                }
            }

            ConversationStep::Confirmation => {
                let StepInput::Decision { accept } = input else {
                    return Err(ConversationError::InvalidInput(
                        "expected an accept/decline decision".to_string(),
                    ));
                };

                if accept {
                    state.current_step = ConversationStep::DetailsCollection;
                    AdvanceOutcome {
                        session_id,
                        session_status: SessionStatus::Active,
                        current_step: ConversationStep::DetailsCollection,
                        prompt: prompt_details(),
                        terminal: false,
                    }
                } else {
                    // Re-pick; slots are recomputed since time may have
                    // passed. Collected details stay in context.
                    self.back_to_slot_offer(
                        &session,
                        &mut state,
                        now,
                        "No problem. Pick a different time.",
                        auth_token,
                    )
                    .await?
                }
            }

            ConversationStep::DetailsCollection => {
                let StepInput::Details { name, notes } = input else {
                    return Err(ConversationError::InvalidInput(
                        "expected name and optional notes".to_string(),
                    ));
                };
                if name.trim().is_empty() {
                    return Err(ConversationError::InvalidInput(
                        "name is required".to_string(),
                    ));
                }

                state.context.client_name = Some(name);
                state.context.notes = notes;

                let slot = state.context.selected_slot.clone().ok_or_else(|| {
                    ConversationError::InvalidInput("no slot has been selected".to_string())
                })?;

                let booking = BookAppointmentRequest {
                    client_id: session.client_id,
                    practitioner_id: session.practitioner_id,
                    date: slot.date,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    entry_method: session.entry_method,
                };

                match self.resolver.try_book(booking, now, auth_token).await {
                    Ok(appointment) => {
                        state.current_step = ConversationStep::Completed;
                        self.persist_state(&state, now, auth_token).await?;
                        // Commit wins over any racing cancel: the session
                        // is completed unconditionally.
                        self.set_session_status(session.id, SessionStatus::Completed, now, auth_token)
                            .await?;
                        self.events.emit(
                            BookingEventKind::BookingCommitted,
                            session.id,
                            session.entry_method,
                        );
                        info!(
                            "Session {} completed with appointment {}",
                            session.id, appointment.id
                        );
                        return Ok(AdvanceOutcome {
                            session_id,
                            session_status: SessionStatus::Completed,
                            current_step: ConversationStep::Completed,
                            prompt: json!({
                                "message": "Your appointment is booked.",
                                "appointment_id": appointment.id,
                                "date": slot.date,
                                "start_time": slot.start_time,
                                "end_time": slot.end_time
                            }),
                            terminal: true,
                        });
                    }
                    Err(SchedulingError::Conflict) => {
                        self.events.emit(
                            BookingEventKind::BookingConflict,
                            session.id,
                            session.entry_method,
                        );
                        warn!("Session {} lost the booking race; re-offering slots", session.id);
                        self.back_to_slot_offer(
                            &session,
                            &mut state,
                            now,
                            "That time was just taken by someone else. Please pick another.",
                            auth_token,
                        )
                        .await?
                    }
                    Err(
                        e @ (SchedulingError::InvalidTime(_)
                        | SchedulingError::DateInPast
                        | SchedulingError::OutsideAvailability),
                    ) => {
                        // Step does not advance; the adapter reports the
                        // offending field and the client retries.
                        return Err(ConversationError::InvalidInput(e.to_string()));
                    }
                    Err(e) => return Err(ConversationError::DatabaseError(e.to_string())),
                }
            }

            ConversationStep::Completed => terminal_outcome(&session, &state),
        };

        if !outcome.terminal {
            self.persist_state(&state, now, auth_token).await?;
            self.events
                .emit(BookingEventKind::StepAdvanced, session.id, session.entry_method);
        }

        Ok(outcome)
    }

    /// Explicit cancel: active sessions become abandoned immediately;
    /// terminal sessions are answered idempotently.
    #[instrument(skip(self, auth_token))]
    pub async fn cancel(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<AdvanceOutcome, ConversationError> {
        let (session, state) = self.load(session_id, auth_token).await?;

        if session.status.is_terminal() {
            return Ok(terminal_outcome(&session, &state));
        }

        if is_expired(state.last_updated, now, self.session_timeout) {
            return self.expire(&session, &state, auth_token).await;
        }

        self.set_session_status(session_id, SessionStatus::Abandoned, now, auth_token)
            .await?;
        self.events
            .emit(BookingEventKind::SessionAbandoned, session_id, session.entry_method);
        info!("Session {} abandoned", session_id);

        Ok(AdvanceOutcome {
            session_id,
            session_status: SessionStatus::Abandoned,
            current_step: state.current_step,
            prompt: json!({ "message": "Booking cancelled. Start a new session any time." }),
            terminal: true,
        })
    }

    /// Housekeeping sweep applying the same expiry rule as lazy expiry.
    /// Returns the number of sessions expired.
    pub async fn expire_stale_sessions(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<u32, ConversationError> {
        let cutoff = now - self.session_timeout;
        let path = format!(
            "/rest/v1/session_states?last_updated=lt.{}&select=session_id",
            urlencoding::encode(&cutoff.to_rfc3339())
        );

        let rows: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &path, Some(auth_token), None)
        })
        .await
        .map_err(|e| ConversationError::DatabaseError(e.to_string()))?;

        let mut expired = 0;
        for row in rows {
            let Some(session_id) = row
                .get("session_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok())
            else {
                continue;
            };

            let (session, state) = match self.load(session_id, auth_token).await {
                Ok(pair) => pair,
                Err(ConversationError::SessionNotFound) => continue,
                Err(e) => return Err(e),
            };

            if !session.status.is_terminal() && is_expired(state.last_updated, now, self.session_timeout)
            {
                self.expire(&session, &state, auth_token).await?;
                expired += 1;
            }
        }

        if expired > 0 {
            info!("Expired {} stale sessions", expired);
        }
        Ok(expired)
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn load(
        &self,
        session_id: Uuid,
        auth_token: &str,
    ) -> Result<(ConversationSession, SessionState), ConversationError> {
        let session_path = format!("/rest/v1/conversation_sessions?id=eq.{}", session_id);
        let rows: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &session_path, Some(auth_token), None)
        })
        .await
        .map_err(|e| ConversationError::DatabaseError(e.to_string()))?;

        let session_row = rows.into_iter().next().ok_or(ConversationError::SessionNotFound)?;
        let session: ConversationSession = serde_json::from_value(session_row)
            .map_err(|e| ConversationError::DatabaseError(format!("Failed to parse session: {}", e)))?;

        let state_path = format!("/rest/v1/session_states?session_id=eq.{}", session_id);
        let rows: Vec<Value> = with_read_retry(|| {
            self.supabase
                .request(Method::GET, &state_path, Some(auth_token), None)
        })
        .await
        .map_err(|e| ConversationError::DatabaseError(e.to_string()))?;

        let state_row = rows.into_iter().next().ok_or_else(|| {
            ConversationError::DatabaseError(format!("Session {} has no state row", session_id))
        })?;
        let state: SessionState = serde_json::from_value(state_row)
            .map_err(|e| ConversationError::DatabaseError(format!("Failed to parse state: {}", e)))?;

        Ok((session, state))
    }

    async fn compute_slots_for(
        &self,
        session: &ConversationSession,
        date: chrono::NaiveDate,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<availability_cell::Slot>, ConversationError> {
        self.calculator
            .compute_slots(
                session.practitioner_id,
                date,
                self.slot_duration_minutes,
                now,
                auth_token,
            )
            .await
            .map_err(|e| match e {
                AvailabilityError::PractitionerNotFound => ConversationError::PractitionerNotFound,
                AvailabilityError::InvalidDuration(_) => {
                    ConversationError::InvalidInput(e.to_string())
                }
                AvailabilityError::DatabaseError(msg) => ConversationError::DatabaseError(msg),
            })
    }

    /// Recompute slots for the context date and drop back to time
    /// selection, or all the way to date selection when nothing is left.
    async fn back_to_slot_offer(
        &self,
        session: &ConversationSession,
        state: &mut SessionState,
        now: DateTime<Utc>,
        message: &str,
        auth_token: &str,
    ) -> Result<AdvanceOutcome, ConversationError> {
        let date = state.context.selected_date.ok_or_else(|| {
            ConversationError::InvalidInput("no date has been selected".to_string())
        })?;

        let slots = self.compute_slots_for(session, date, now, auth_token).await?;

        if slots.is_empty() {
            state.context.offered = None;
            state.current_step = ConversationStep::DateSelection;
            return Ok(AdvanceOutcome {
                session_id: session.id,
                session_status: SessionStatus::Active,
                current_step: ConversationStep::DateSelection,
                prompt: prompt_date(&format!(
                    "{} No more times are free on {}; please pick another date.",
                    message, date
                )),
                terminal: false,
            });
        }

        let offered = OfferedSlots { date, slots };
        let prompt = prompt_slots(&offered, message);
        state.context.offered = Some(offered);
        state.current_step = ConversationStep::TimeSelection;
        Ok(AdvanceOutcome {
            session_id: session.id,
            session_status: SessionStatus::Active,
            current_step: ConversationStep::TimeSelection,
            prompt,
            terminal: false,
        })
    }

    async fn expire(
        &self,
        session: &ConversationSession,
        state: &SessionState,
        auth_token: &str,
    ) -> Result<AdvanceOutcome, ConversationError> {
        self.set_session_status(session.id, SessionStatus::Expired, Utc::now(), auth_token)
            .await?;
        self.events
            .emit(BookingEventKind::SessionExpired, session.id, session.entry_method);
        info!("Session {} expired after inactivity", session.id);

        Ok(AdvanceOutcome {
            session_id: session.id,
            session_status: SessionStatus::Expired,
            current_step: state.current_step,
            prompt: json!({
                "message": "This session expired after inactivity. Please start a new one."
            }),
            terminal: true,
        })
    }

    async fn persist_state(
        &self,
        state: &SessionState,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), ConversationError> {
        let context = serde_json::to_value(&state.context)
            .map_err(|e| ConversationError::DatabaseError(e.to_string()))?;

        let bytes = context.to_string().len();
        if bytes > self.context_cap {
            return Err(ConversationError::ContextTooLarge {
                bytes,
                cap: self.context_cap,
            });
        }

        let path = format!("/rest/v1/session_states?session_id=eq.{}", state.session_id);
        let body = json!({
            "current_step": state.current_step,
            "context": context,
            "last_updated": now.to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ConversationError::DatabaseError(e.to_string()))?;

        debug!("Persisted state for session {} at step {}", state.session_id, state.current_step);
        Ok(())
    }

    async fn set_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), ConversationError> {
        let path = format!("/rest/v1/conversation_sessions?id=eq.{}", session_id);
        let body = json!({
            "status": status.to_string(),
            "ended_at": if status.is_terminal() { Some(now.to_rfc3339()) } else { None }
        });

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ConversationError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn insert_row(
        &self,
        path: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<Vec<Value>, ConversationError> {
        self.supabase
            .request_with_headers(
                Method::POST,
                path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ConversationError::DatabaseError(e.to_string()))
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn terminal_outcome(session: &ConversationSession, state: &SessionState) -> AdvanceOutcome {
    AdvanceOutcome {
        session_id: session.id,
        session_status: session.status,
        current_step: state.current_step,
        prompt: json!({
            "message": format!("This session is {} and accepts no further input.", session.status)
        }),
        terminal: true,
    }
}

fn prompt_date(message: &str) -> Value {
    json!({ "message": message, "request": "date" })
}

fn prompt_slots(offered: &OfferedSlots, message: &str) -> Value {
    json!({
        "message": message,
        "request": "slot_index",
        "date": offered.date,
        "slots": offered.slots
    })
}

fn prompt_confirmation(slot: &availability_cell::Slot) -> Value {
    json!({
        "message": "Confirm this appointment?",
        "request": "decision",
        "date": slot.date,
        "start_time": slot.start_time,
        "end_time": slot.end_time
    })
}

fn prompt_details() -> Value {
    json!({
        "message": "Almost done. What name should the booking be under? Notes are optional.",
        "request": "details"
    })
}
