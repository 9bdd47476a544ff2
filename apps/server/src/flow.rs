//! Booking flow state machine.
//!
//! The wizard is a value type: every transition consumes the machine and
//! returns either the next state or a `FlowError`, so there is no mutable
//! step-spanning state anywhere. Each variant carries only the data that is
//! valid at that step. Dropping the machine cancels the flow with no side
//! effects; nothing is persisted before `Submitting` succeeds.
//!
//! Slot lists are date-dependent, so entering or changing the date yields a
//! `SlotQuery` command for the caller to execute. The computed slots are
//! applied back together with that query; a response whose query no longer
//! matches the current selection is silently ignored (stale-response guard).

use std::collections::HashSet;

use thiserror::Error;

// ── Errors ──

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("this action is not valid at the current step")]
    WrongStep,
    #[error("unknown or inactive service")]
    UnknownService,
    #[error("unknown professional")]
    UnknownProfessional,
    #[error("the selected professional does not offer this service")]
    ProfessionalMismatch,
    #[error("invalid date")]
    InvalidDate,
    #[error("the studio is closed on that date")]
    DateUnavailable,
    #[error("time slots are not loaded for the selected date")]
    SlotsNotLoaded,
    #[error("the selected time is no longer available")]
    StaleSlotSelection,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("phone must be a valid number like (11) 98765-4321")]
    InvalidPhone,
}

// ── Context & supporting types ──

/// Read-only configuration the flow validates against, extracted from a
/// studio snapshot. Consistent for the duration of one booking session.
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub studio_id: i64,
    pub buffer_min: u16,
    pub services: Vec<ServiceOffer>,
    pub professional_ids: Vec<i64>,
    pub blocked_dates: HashSet<String>,
}

impl FlowContext {
    fn offer(&self, service_id: i64) -> Option<&ServiceOffer> {
        self.services.iter().find(|s| s.id == service_id)
    }
}

/// The slice of a service the flow needs for its guards.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOffer {
    pub id: i64,
    pub professional_id: i64,
    pub duration_min: u16,
    pub requires_signal: bool,
    pub signal_amount_cents: i64,
}

/// Command emitted when the (date, professional, service) triple changes:
/// the caller fetches occupancy, computes slots and applies them back.
/// Doubles as the staleness key for the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub service_id: i64,
    pub professional_id: i64,
    pub date: String,
    pub duration_min: u16,
    pub buffer_min: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    /// Normalized "(DD) DDDDD-DDDD" form.
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct SlotSelection {
    pub service_id: i64,
    pub professional_id: i64,
    pub date: String,
    pub time_min: u16,
}

/// The finalized request handed to the appointment writer.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub studio_id: i64,
    pub service_id: i64,
    pub professional_id: i64,
    pub date: String,
    pub time_min: u16,
    pub client: ClientInfo,
    pub requires_signal: bool,
    pub signal_amount_cents: i64,
}

/// Wizard steps a caller may navigate back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Service,
    Professional,
    DateTime,
    ClientInfo,
}

// ── The machine ──

#[derive(Debug, Clone)]
pub enum BookingFlow {
    SelectingService {
        ctx: FlowContext,
    },
    SelectingProfessional {
        ctx: FlowContext,
        service_id: i64,
        /// Auto-preselected owner of the chosen service.
        preselected: Option<i64>,
    },
    SelectingDateTime {
        ctx: FlowContext,
        service_id: i64,
        professional_id: i64,
        date: Option<String>,
        slots: Option<(SlotQuery, Vec<u16>)>,
    },
    EnteringClientInfo {
        ctx: FlowContext,
        selection: SlotSelection,
        /// Previously entered info, kept across a failed submission.
        draft: Option<ClientInfo>,
    },
    Submitting {
        ctx: FlowContext,
        selection: SlotSelection,
        request: BookingRequest,
    },
    Confirmed {
        appointment_id: i64,
    },
    AwaitingPayment {
        appointment_id: i64,
        payment_url: Option<String>,
    },
    Paid {
        appointment_id: i64,
    },
}

impl BookingFlow {
    pub fn new(ctx: FlowContext) -> Self {
        BookingFlow::SelectingService { ctx }
    }

    /// Pick a service; auto-preselects the service's owning professional.
    pub fn select_service(self, service_id: i64) -> Result<Self, FlowError> {
        match self {
            BookingFlow::SelectingService { ctx } => {
                let offer = ctx.offer(service_id).ok_or(FlowError::UnknownService)?;
                let preselected = Some(offer.professional_id);
                Ok(BookingFlow::SelectingProfessional {
                    ctx,
                    service_id,
                    preselected,
                })
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// Confirm the professional (explicit choice wins over the preselect).
    pub fn choose_professional(self, professional_id: Option<i64>) -> Result<Self, FlowError> {
        match self {
            BookingFlow::SelectingProfessional {
                ctx,
                service_id,
                preselected,
            } => {
                let chosen = professional_id
                    .or(preselected)
                    .ok_or(FlowError::MissingField("professional"))?;
                if !ctx.professional_ids.contains(&chosen) {
                    return Err(FlowError::UnknownProfessional);
                }
                let offer = ctx.offer(service_id).ok_or(FlowError::UnknownService)?;
                if offer.professional_id != chosen {
                    return Err(FlowError::ProfessionalMismatch);
                }
                Ok(BookingFlow::SelectingDateTime {
                    ctx,
                    service_id,
                    professional_id: chosen,
                    date: None,
                    slots: None,
                })
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// Set (or change) the date. Clears any previously loaded slots and
    /// returns the `SlotQuery` the caller must execute.
    pub fn select_date(self, date: &str) -> Result<(Self, SlotQuery), FlowError> {
        match self {
            BookingFlow::SelectingDateTime {
                ctx,
                service_id,
                professional_id,
                ..
            } => {
                if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err(FlowError::InvalidDate);
                }
                if ctx.blocked_dates.contains(date) {
                    return Err(FlowError::DateUnavailable);
                }
                let offer = ctx.offer(service_id).ok_or(FlowError::UnknownService)?;
                let query = SlotQuery {
                    service_id,
                    professional_id,
                    date: date.to_string(),
                    duration_min: offer.duration_min,
                    buffer_min: ctx.buffer_min,
                };
                let next = BookingFlow::SelectingDateTime {
                    ctx,
                    service_id,
                    professional_id,
                    date: Some(date.to_string()),
                    slots: None,
                };
                Ok((next, query))
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// Apply a computed slot list. Responses for a query that no longer
    /// matches the current selection are ignored.
    pub fn apply_slots(self, query: &SlotQuery, slots: Vec<u16>) -> Self {
        match self {
            BookingFlow::SelectingDateTime {
                ctx,
                service_id,
                professional_id,
                date: Some(date),
                slots: _,
            } if query.service_id == service_id
                && query.professional_id == professional_id
                && query.date == date =>
            {
                BookingFlow::SelectingDateTime {
                    ctx,
                    service_id,
                    professional_id,
                    date: Some(date),
                    slots: Some((query.clone(), slots)),
                }
            }
            other => other,
        }
    }

    /// Pick a start time; it must be a member of the current slot list.
    pub fn select_time(self, time_min: u16) -> Result<Self, FlowError> {
        match self {
            BookingFlow::SelectingDateTime {
                ctx,
                service_id,
                professional_id,
                date: Some(date),
                slots,
            } => {
                let (_, times) = slots.ok_or(FlowError::SlotsNotLoaded)?;
                if !times.contains(&time_min) {
                    return Err(FlowError::StaleSlotSelection);
                }
                Ok(BookingFlow::EnteringClientInfo {
                    ctx,
                    selection: SlotSelection {
                        service_id,
                        professional_id,
                        date,
                        time_min,
                    },
                    draft: None,
                })
            }
            BookingFlow::SelectingDateTime { date: None, .. } => {
                Err(FlowError::MissingField("date"))
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// Provide client info and move into `Submitting`.
    pub fn enter_client_info(
        self,
        name: &str,
        phone: &str,
        email: &str,
    ) -> Result<Self, FlowError> {
        match self {
            BookingFlow::EnteringClientInfo { ctx, selection, .. } => {
                let name = name.trim();
                let email = email.trim();
                if name.is_empty() {
                    return Err(FlowError::MissingField("name"));
                }
                if phone.trim().is_empty() {
                    return Err(FlowError::MissingField("phone"));
                }
                if email.is_empty() {
                    return Err(FlowError::MissingField("email"));
                }
                let phone = normalize_phone(phone).ok_or(FlowError::InvalidPhone)?;
                let offer = ctx
                    .offer(selection.service_id)
                    .ok_or(FlowError::UnknownService)?;
                let request = BookingRequest {
                    studio_id: ctx.studio_id,
                    service_id: selection.service_id,
                    professional_id: selection.professional_id,
                    date: selection.date.clone(),
                    time_min: selection.time_min,
                    client: ClientInfo {
                        name: name.to_string(),
                        phone,
                        email: email.to_string(),
                    },
                    requires_signal: offer.requires_signal,
                    signal_amount_cents: offer.signal_amount_cents,
                };
                Ok(BookingFlow::Submitting {
                    ctx,
                    selection,
                    request,
                })
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// Read the finalized request while in `Submitting`.
    pub fn request(&self) -> Option<&BookingRequest> {
        match self {
            BookingFlow::Submitting { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Record a successful persistence. Branches on whether the service
    /// requires a signal payment.
    pub fn submitted(
        self,
        appointment_id: i64,
        payment_url: Option<String>,
    ) -> Result<Self, FlowError> {
        match self {
            BookingFlow::Submitting { request, .. } => {
                if request.requires_signal {
                    Ok(BookingFlow::AwaitingPayment {
                        appointment_id,
                        payment_url,
                    })
                } else {
                    Ok(BookingFlow::Confirmed { appointment_id })
                }
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// A failed persistence drops the machine back to `EnteringClientInfo`,
    /// keeping the entered data so the user does not re-type it.
    pub fn submit_failed(self) -> Result<Self, FlowError> {
        match self {
            BookingFlow::Submitting {
                ctx,
                selection,
                request,
            } => Ok(BookingFlow::EnteringClientInfo {
                ctx,
                selection,
                draft: Some(request.client),
            }),
            _ => Err(FlowError::WrongStep),
        }
    }

    /// External payment success signal.
    pub fn payment_succeeded(self) -> Result<Self, FlowError> {
        match self {
            BookingFlow::AwaitingPayment { appointment_id, .. } => {
                Ok(BookingFlow::Paid { appointment_id })
            }
            _ => Err(FlowError::WrongStep),
        }
    }

    /// Navigate back to an earlier wizard step, dropping everything the
    /// later steps accumulated. Forward or same-step targets are rejected.
    pub fn back_to(self, step: Step) -> Result<Self, FlowError> {
        let Some(current) = self.current_step() else {
            return Err(FlowError::WrongStep);
        };
        if step >= current {
            return Err(FlowError::WrongStep);
        }
        let (ctx, service_id, professional_id) = match self {
            BookingFlow::SelectingProfessional {
                ctx, service_id, ..
            } => (ctx, Some(service_id), None),
            BookingFlow::SelectingDateTime {
                ctx,
                service_id,
                professional_id,
                ..
            } => (ctx, Some(service_id), Some(professional_id)),
            BookingFlow::EnteringClientInfo { ctx, selection, .. }
            | BookingFlow::Submitting { ctx, selection, .. } => (
                ctx,
                Some(selection.service_id),
                Some(selection.professional_id),
            ),
            _ => return Err(FlowError::WrongStep),
        };
        match step {
            Step::Service => Ok(BookingFlow::SelectingService { ctx }),
            Step::Professional => {
                let service_id = service_id.ok_or(FlowError::WrongStep)?;
                let preselected = ctx.offer(service_id).map(|o| o.professional_id);
                Ok(BookingFlow::SelectingProfessional {
                    ctx,
                    service_id,
                    preselected,
                })
            }
            Step::DateTime => Ok(BookingFlow::SelectingDateTime {
                ctx,
                service_id: service_id.ok_or(FlowError::WrongStep)?,
                professional_id: professional_id.ok_or(FlowError::WrongStep)?,
                date: None,
                slots: None,
            }),
            Step::ClientInfo => Err(FlowError::WrongStep),
        }
    }

    fn current_step(&self) -> Option<Step> {
        match self {
            BookingFlow::SelectingService { .. } => Some(Step::Service),
            BookingFlow::SelectingProfessional { .. } => Some(Step::Professional),
            BookingFlow::SelectingDateTime { .. } => Some(Step::DateTime),
            BookingFlow::EnteringClientInfo { .. } | BookingFlow::Submitting { .. } => {
                Some(Step::ClientInfo)
            }
            _ => None,
        }
    }
}

// ── Phone normalization ──

/// Normalize a phone number to "(DD) DDDDD-DDDD" (11 digits) or
/// "(DD) DDDD-DDDD" (10 digits, no ninth digit). Anything else is rejected.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        11 => Some(format!(
            "({}) {}-{}",
            &digits[..2],
            &digits[2..7],
            &digits[7..]
        )),
        10 => Some(format!(
            "({}) {}-{}",
            &digits[..2],
            &digits[2..6],
            &digits[6..]
        )),
        _ => None,
    }
}

// ── Tests ──
