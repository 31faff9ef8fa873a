use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use tracing::info;

use crate::domain::models::{
    booking::{Booking, BookingStatus, BookingType, NewBookingParams},
    recurring::{
        slot_windows_overlap, RecurrencePattern, RecurringRequest, RecurringTemplate,
        RecurringTimeSlot, RecurrenceOutcome, TimeSlotConflict, RECURRING_LESSON_MINUTES,
    },
    time::{parse_utc, Interval, TimeOfDay, Weekday},
};
use crate::domain::models::user::User;
use crate::domain::ports::{BookingRepository, Clock, RecurringRepository, UserRepository};
use crate::domain::services::transitions;
use crate::error::{AppError, BookingError};

const ALTERNATIVE_HOUR_SHIFTS: [i32; 4] = [-2, -1, 1, 2];

/// First instant at or after `now` falling on `weekday` at `tod` (UTC).
pub fn first_occurrence(now: DateTime<Utc>, weekday: Weekday, tod: TimeOfDay) -> DateTime<Utc> {
    let today = now.date_naive();
    let target = weekday.to_chrono().num_days_from_monday() as i64;
    let current = today.weekday().num_days_from_monday() as i64;
    let ahead = (target - current).rem_euclid(7);
    let mut candidate = (today + Duration::days(ahead))
        .and_time(tod.to_naive_time())
        .and_utc();
    if candidate < now {
        candidate += Duration::weeks(1);
    }
    candidate
}

pub fn step(pattern: RecurrencePattern, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match pattern {
        RecurrencePattern::Weekly => Some(instant + Duration::weeks(1)),
        RecurrencePattern::Biweekly => Some(instant + Duration::weeks(2)),
        RecurrencePattern::Monthly => instant.checked_add_months(Months::new(1)),
    }
}

/// Expansion horizon: UTC midnight of today plus one month.
pub fn horizon_end(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    midnight
        .checked_add_months(Months::new(1))
        .unwrap_or(midnight + Duration::days(31))
}

pub fn expand_slot(
    now: DateTime<Utc>,
    horizon: DateTime<Utc>,
    weekday: Weekday,
    tod: TimeOfDay,
    pattern: RecurrencePattern,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut instant = first_occurrence(now, weekday, tod);
    while instant < horizon {
        out.push(instant);
        match step(pattern, instant) {
            Some(next) => instant = next,
            None => break,
        }
    }
    out
}

/// Materializes a weekday/time template into concrete child bookings over a
/// one-month horizon, surfacing conflicts with free alternatives and
/// applying per-instance overrides.
pub struct RecurrenceService {
    bookings: Arc<dyn BookingRepository>,
    users: Arc<dyn UserRepository>,
    recurring: Arc<dyn RecurringRepository>,
    clock: Arc<dyn Clock>,
}

impl RecurrenceService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        users: Arc<dyn UserRepository>,
        recurring: Arc<dyn RecurringRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            users,
            recurring,
            clock,
        }
    }

    pub async fn create(
        &self,
        current: &User,
        request: RecurringRequest,
    ) -> Result<RecurrenceOutcome, AppError> {
        if current.is_tutor() {
            return Err(
                BookingError::InvalidInput("recurring lessons are requested by students".into())
                    .into(),
            );
        }
        if request.host_id == current.id {
            return Err(BookingError::InvalidParticipant.into());
        }
        let host = self
            .users
            .find_by_id(&request.host_id)
            .await?
            .ok_or(BookingError::UserNotFound)?;
        if !host.is_tutor() {
            return Err(BookingError::InvalidHost.into());
        }

        let parsed = parse_slots(&request.slots)?;

        let now = self.clock.now();
        let history = self
            .bookings
            .list_for_pair(&host.id, &current.id, now, now)
            .await?;
        let met_before = history.iter().any(|b| {
            matches!(b.status, BookingStatus::Completed | BookingStatus::Scheduled)
        });
        if !met_before {
            return Err(BookingError::NoPriorBooking.into());
        }

        // I6: no window overlap with another ACTIVE template of this host.
        let existing_slots = self.recurring.active_slots_for_host(&host.id).await?;
        let prospective: Vec<RecurringTimeSlot> = parsed
            .iter()
            .map(|(wd, tod)| RecurringTimeSlot::new(String::new(), *wd, *tod))
            .collect();
        for new_slot in &prospective {
            if existing_slots.iter().any(|s| slot_windows_overlap(s, new_slot)) {
                return Err(BookingError::RecurringTemplateConflict.into());
            }
        }

        let horizon = horizon_end(now);
        let mut instances: Vec<DateTime<Utc>> = parsed
            .iter()
            .flat_map(|(wd, tod)| expand_slot(now, horizon, *wd, *tod, request.pattern))
            .collect();
        instances.sort();
        instances.dedup();

        let offenders = self.detect(&host.id, &current.id, &instances).await?;

        let final_instances = if offenders.is_empty() {
            instances
        } else {
            let conflicts = self
                .with_alternatives(&host.id, &current.id, now, &instances, &offenders)
                .await?;

            if request.overrides.is_empty() {
                return Ok(RecurrenceOutcome {
                    recurring_template_id: None,
                    conflicts,
                });
            }

            let mut override_map: HashMap<DateTime<Utc>, &crate::domain::models::recurring::OverrideDirective> =
                HashMap::new();
            for o in &request.overrides {
                let instant = parse_utc(&o.conflict_time).ok_or(BookingError::InvalidDate)?;
                override_map.insert(instant, o);
            }

            let unhandled: Vec<TimeSlotConflict> = conflicts
                .iter()
                .filter(|c| !override_map.contains_key(&c.conflict_time))
                .cloned()
                .collect();
            if !unhandled.is_empty() {
                return Ok(RecurrenceOutcome {
                    recurring_template_id: None,
                    conflicts: unhandled,
                });
            }

            let moved = apply_overrides(&instances, &offenders, &override_map)?;

            // One re-check over the final plan; anything left is on the caller.
            let remaining = self.detect(&host.id, &current.id, &moved).await?;
            if !remaining.is_empty() {
                return Err(BookingError::OverrideConflict.into());
            }
            moved
        };

        let template = RecurringTemplate::new(host.id.clone(), request.pattern, now);
        let slots: Vec<RecurringTimeSlot> = parsed
            .iter()
            .map(|(wd, tod)| RecurringTimeSlot::new(template.id.clone(), *wd, *tod))
            .collect();
        let children: Vec<Booking> = final_instances
            .iter()
            .map(|start| {
                Booking::new(
                    NewBookingParams {
                        title: request.title.clone(),
                        description: request.description.clone(),
                        start: *start,
                        booking_type: BookingType::Lesson,
                        status: BookingStatus::AwaitingStudentConfirmation,
                        host_id: host.id.clone(),
                        service_id: None,
                        recurring_template_id: Some(template.id.clone()),
                    },
                    now,
                )
            })
            .collect();

        let template_id = self
            .recurring
            .create_with_bookings(&template, &slots, &children, &current.id)
            .await?;

        info!(
            template_id = %template_id,
            host_id = %host.id,
            children = children.len(),
            "recurring template created"
        );
        Ok(RecurrenceOutcome {
            recurring_template_id: Some(template_id),
            conflicts: Vec::new(),
        })
    }

    /// Which planned instances collide with existing active bookings of the
    /// host or the student. One repository round trip.
    async fn detect(
        &self,
        host_id: &str,
        student_id: &str,
        instances: &[DateTime<Utc>],
    ) -> Result<Vec<DateTime<Utc>>, AppError> {
        if instances.is_empty() {
            return Ok(Vec::new());
        }
        let intervals: Vec<Interval> = instances
            .iter()
            .map(|t| Interval::starting_at(*t, RECURRING_LESSON_MINUTES as i64))
            .collect();
        let busy = self
            .bookings
            .find_overlapping(host_id, Some(student_id), &intervals)
            .await?;

        Ok(intervals
            .iter()
            .filter(|iv| {
                busy.iter().any(|b| {
                    transitions::is_active(b.status) && b.overlaps_window(iv.start, iv.end)
                })
            })
            .map(|iv| iv.start)
            .collect())
    }

    /// Builds the conflict report: for every offender, same-day starts
    /// shifted by ±1h/±2h that are on-grid, in the future and free. The
    /// availability lookup for all candidates is batched into one query.
    async fn with_alternatives(
        &self,
        host_id: &str,
        student_id: &str,
        now: DateTime<Utc>,
        instances: &[DateTime<Utc>],
        offenders: &[DateTime<Utc>],
    ) -> Result<Vec<TimeSlotConflict>, AppError> {
        let mut candidates: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for offender in offenders {
            let tod = TimeOfDay::of(*offender);
            for shift in ALTERNATIVE_HOUR_SHIFTS {
                if let Some(alt) = tod.shifted_hours(shift)
                    && alt.fits_within_day(RECURRING_LESSON_MINUTES)
                {
                    let alt_start = offender
                        .date_naive()
                        .and_time(alt.to_naive_time())
                        .and_utc();
                    if alt_start >= now {
                        candidates.push((*offender, alt_start));
                    }
                }
            }
        }

        let intervals: Vec<Interval> = candidates
            .iter()
            .map(|(_, start)| Interval::starting_at(*start, RECURRING_LESSON_MINUTES as i64))
            .collect();
        let busy = if intervals.is_empty() {
            Vec::new()
        } else {
            self.bookings
                .find_overlapping(host_id, Some(student_id), &intervals)
                .await?
        };

        let mut report = Vec::new();
        for offender in offenders {
            let mut free: Vec<String> = candidates
                .iter()
                .filter(|(of, _)| of == offender)
                .filter(|(_, start)| {
                    let iv = Interval::starting_at(*start, RECURRING_LESSON_MINUTES as i64);
                    let db_free = !busy.iter().any(|b| {
                        transitions::is_active(b.status) && b.overlaps_window(iv.start, iv.end)
                    });
                    let plan_free = !instances.iter().any(|planned| {
                        planned != offender
                            && iv.overlaps(&Interval::starting_at(
                                *planned,
                                RECURRING_LESSON_MINUTES as i64,
                            ))
                    });
                    db_free && plan_free
                })
                .map(|(_, start)| TimeOfDay::of(*start).to_string())
                .collect();
            free.sort();
            report.push(TimeSlotConflict {
                conflict_time: *offender,
                alternative_times: free,
            });
        }
        Ok(report)
    }
}

fn parse_slots(slots: &[crate::domain::models::recurring::TimeSlotInput]) -> Result<Vec<(Weekday, TimeOfDay)>, AppError> {
    if slots.is_empty() {
        return Err(BookingError::InvalidTimeSlot.into());
    }
    let mut parsed = Vec::with_capacity(slots.len());
    for slot in slots {
        let tod = TimeOfDay::parse(&slot.time_of_day).ok_or(BookingError::InvalidTimeSlot)?;
        if !tod.on_grid() || !tod.fits_within_day(RECURRING_LESSON_MINUTES) {
            return Err(BookingError::InvalidTimeSlot.into());
        }
        parsed.push((slot.weekday, tod));
    }
    for (i, (wd_a, tod_a)) in parsed.iter().enumerate() {
        for (wd_b, tod_b) in parsed.iter().skip(i + 1) {
            if wd_a == wd_b {
                let (a, b) = (tod_a.minutes_from_midnight(), tod_b.minutes_from_midnight());
                if a < b + RECURRING_LESSON_MINUTES && a + RECURRING_LESSON_MINUTES > b {
                    return Err(BookingError::OverlappingTimeSlots.into());
                }
            }
        }
    }
    Ok(parsed)
}

fn apply_overrides(
    instances: &[DateTime<Utc>],
    offenders: &[DateTime<Utc>],
    overrides: &HashMap<DateTime<Utc>, &crate::domain::models::recurring::OverrideDirective>,
) -> Result<Vec<DateTime<Utc>>, AppError> {
    let mut result = Vec::with_capacity(instances.len());
    for instant in instances {
        if !offenders.contains(instant) {
            result.push(*instant);
            continue;
        }
        let directive = overrides
            .get(instant)
            .expect("unhandled conflicts were filtered out");
        if directive.cancel {
            continue;
        }
        let raw = directive
            .new_time_of_day
            .as_deref()
            .ok_or(BookingError::InvalidOverrideTime)?;
        let tod = TimeOfDay::parse(raw).ok_or(BookingError::InvalidOverrideTime)?;
        if !tod.on_grid() || !tod.fits_within_day(RECURRING_LESSON_MINUTES) {
            return Err(BookingError::InvalidOverrideTime.into());
        }
        result.push(instant.date_naive().and_time(tod.to_naive_time()).and_utc());
    }
    result.sort();

    // A move may not land on another planned instance.
    for pair in result.windows(2) {
        if pair[0] + Duration::minutes(RECURRING_LESSON_MINUTES as i64) > pair[1] {
            return Err(BookingError::OverrideConflict.into());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        parse_utc(s).unwrap()
    }

    #[test]
    fn first_occurrence_lands_on_requested_weekday() {
        // 2030-01-15 is a Tuesday.
        let now = utc("2030-01-15T12:00:00Z");
        let t = first_occurrence(now, Weekday::Monday, TimeOfDay::parse("10:00").unwrap());
        assert_eq!(t, utc("2030-01-21T10:00:00Z"));
    }

    #[test]
    fn first_occurrence_same_day_future_time_stays_today() {
        let now = utc("2030-01-15T08:00:00Z");
        let t = first_occurrence(now, Weekday::Tuesday, TimeOfDay::parse("10:00").unwrap());
        assert_eq!(t, utc("2030-01-15T10:00:00Z"));
    }

    #[test]
    fn first_occurrence_same_day_elapsed_time_skips_a_week() {
        let now = utc("2030-01-15T11:00:00Z");
        let t = first_occurrence(now, Weekday::Tuesday, TimeOfDay::parse("10:00").unwrap());
        assert_eq!(t, utc("2030-01-22T10:00:00Z"));
    }

    #[test]
    fn weekly_expansion_stays_inside_horizon() {
        let now = utc("2030-01-15T08:00:00Z");
        let horizon = horizon_end(now);
        assert_eq!(horizon, utc("2030-02-15T00:00:00Z"));

        let instances = expand_slot(
            now,
            horizon,
            Weekday::Monday,
            TimeOfDay::parse("10:00").unwrap(),
            RecurrencePattern::Weekly,
        );
        assert_eq!(
            instances,
            vec![
                utc("2030-01-21T10:00:00Z"),
                utc("2030-01-28T10:00:00Z"),
                utc("2030-02-04T10:00:00Z"),
                utc("2030-02-11T10:00:00Z"),
            ]
        );
    }

    #[test]
    fn biweekly_skips_every_other_week() {
        let now = utc("2030-01-15T08:00:00Z");
        let instances = expand_slot(
            now,
            horizon_end(now),
            Weekday::Monday,
            TimeOfDay::parse("10:00").unwrap(),
            RecurrencePattern::Biweekly,
        );
        assert_eq!(
            instances,
            vec![utc("2030-01-21T10:00:00Z"), utc("2030-02-04T10:00:00Z")]
        );
    }

    #[test]
    fn monthly_steps_by_calendar_month() {
        let now = utc("2030-01-15T08:00:00Z");
        let instances = expand_slot(
            now,
            horizon_end(now),
            Weekday::Tuesday,
            TimeOfDay::parse("09:00").unwrap(),
            RecurrencePattern::Monthly,
        );
        // First instance is today at 09:00 UTC; the next lands beyond the
        // one-month horizon.
        assert_eq!(instances, vec![utc("2030-01-15T09:00:00Z")]);
    }

    #[test]
    fn override_cancel_drops_only_the_offender() {
        let keep = utc("2030-01-28T10:00:00Z");
        let drop = utc("2030-01-21T10:00:00Z");
        let directive = crate::domain::models::recurring::OverrideDirective {
            conflict_time: "2030-01-21T10:00:00.000Z".into(),
            new_time_of_day: None,
            cancel: true,
        };
        let mut map = HashMap::new();
        map.insert(drop, &directive);
        let out = apply_overrides(&[drop, keep], &[drop], &map).unwrap();
        assert_eq!(out, vec![keep]);
    }

    #[test]
    fn override_move_lands_on_same_date() {
        let offender = utc("2030-01-21T10:00:00Z");
        let directive = crate::domain::models::recurring::OverrideDirective {
            conflict_time: "2030-01-21T10:00:00.000Z".into(),
            new_time_of_day: Some("13:00".into()),
            cancel: false,
        };
        let mut map = HashMap::new();
        map.insert(offender, &directive);
        let out = apply_overrides(&[offender], &[offender], &map).unwrap();
        assert_eq!(out, vec![utc("2030-01-21T13:00:00Z")]);
    }

    #[test]
    fn override_move_onto_sibling_instance_is_rejected() {
        let offender = utc("2030-01-21T10:00:00Z");
        let sibling = utc("2030-01-21T13:00:00Z");
        let directive = crate::domain::models::recurring::OverrideDirective {
            conflict_time: "2030-01-21T10:00:00.000Z".into(),
            new_time_of_day: Some("13:00".into()),
            cancel: false,
        };
        let mut map = HashMap::new();
        map.insert(offender, &directive);
        let err = apply_overrides(&[offender, sibling], &[offender], &map).unwrap_err();
        assert!(matches!(
            err,
            AppError::Booking(BookingError::OverrideConflict)
        ));
    }

    #[test]
    fn off_grid_override_is_rejected() {
        let offender = utc("2030-01-21T10:00:00Z");
        let directive = crate::domain::models::recurring::OverrideDirective {
            conflict_time: "2030-01-21T10:00:00.000Z".into(),
            new_time_of_day: Some("13:10".into()),
            cancel: false,
        };
        let mut map = HashMap::new();
        map.insert(offender, &directive);
        let err = apply_overrides(&[offender], &[offender], &map).unwrap_err();
        assert!(matches!(
            err,
            AppError::Booking(BookingError::InvalidOverrideTime)
        ));
    }
}
