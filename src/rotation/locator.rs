//! Slot lookups. Both scans walk `slots` in list order and return the first match, so the
//! caller's ordering decides ties. Nothing here sorts; pass the table order produced by
//! [`build_slots`](crate::rotation::model::build_slots).

use chrono::{DateTime, TimeZone};

use crate::rotation::model::Slot;

/// First slot with `start <= now < end`. Gaps between rows map to `None`.
pub fn active_slot<'a, Tz: TimeZone>(
    now: &DateTime<Tz>,
    slots: &'a [Slot<Tz>],
) -> Option<&'a Slot<Tz>> {
    slots.iter().find(|slot| slot.contains(now))
}

/// First slot that starts strictly after `now`.
pub fn next_boundary<'a, Tz: TimeZone>(
    now: &DateTime<Tz>,
    slots: &'a [Slot<Tz>],
) -> Option<&'a Slot<Tz>> {
    slots.iter().find(|slot| slot.start > *now)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use chrono_tz::Tz;

    use super::*;
    use crate::rotation::model::{Status, build_slots};

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Tz> {
        New_York
            .with_ymd_and_hms(2026, 10, 30, hour, minute, second)
            .single()
            .expect("valid")
    }

    #[test]
    fn finds_active_slot_and_next_boundary() {
        let slots = build_slots(&at(12, 0, 0));
        let now = at(19, 25, 10);
        let active = active_slot(&now, &slots).expect("active slot");
        assert_eq!(active.start, at(19, 20, 0));
        let next = next_boundary(&now, &slots).expect("next boundary");
        assert_eq!(next.start, at(19, 40, 0));
    }

    #[test]
    fn slot_start_is_inclusive_and_end_exclusive() {
        let slots = build_slots(&at(12, 0, 0));
        let active = active_slot(&at(20, 0, 0), &slots).expect("active");
        assert_eq!(active.start, at(20, 0, 0));
        assert_eq!(active.statuses, [Status::Meal, Status::OnSet, Status::OnSet]);
        let next = next_boundary(&at(20, 0, 0), &slots).expect("next");
        assert_eq!(next.start, at(20, 20, 0));
    }

    #[test]
    fn before_show_has_no_active_slot() {
        let slots = build_slots(&at(12, 0, 0));
        let now = at(18, 30, 0);
        assert!(active_slot(&now, &slots).is_none());
        assert_eq!(next_boundary(&now, &slots).expect("next").start, at(19, 0, 0));
    }

    #[test]
    fn gap_between_rows_is_not_active() {
        let slots = vec![
            Slot::new(at(19, 0, 0), [Status::OnSet; 3]),
            Slot::new(at(19, 30, 0), [Status::OffSet; 3]),
        ];
        let now = at(19, 25, 0);
        assert!(active_slot(&now, &slots).is_none());
        assert_eq!(next_boundary(&now, &slots).expect("next").start, at(19, 30, 0));
    }

    #[test]
    fn at_most_one_slot_is_active_across_the_night() {
        let slots = build_slots(&at(12, 0, 0));
        let mut probe = at(18, 0, 0);
        let stop = at(23, 59, 0);
        while probe <= stop {
            let matching = slots.iter().filter(|slot| slot.contains(&probe)).count();
            assert!(matching <= 1);
            if let Some(next) = next_boundary(&probe, &slots) {
                assert!(next.start > probe);
                let position = slots.iter().position(|slot| slot == next).expect("present");
                assert!(slots[..position].iter().all(|slot| slot.start <= probe));
            }
            probe += chrono::Duration::minutes(7);
        }
    }

    #[test]
    fn last_evening_slot_runs_until_midnight() {
        let slots = build_slots(&at(12, 0, 0));
        let late = at(23, 59, 59);
        let active = active_slot(&late, &slots).expect("11:40 PM slot");
        assert_eq!(active.start, at(23, 40, 0));
        assert!(next_boundary(&late, &slots).is_none());
    }

    #[test]
    fn nothing_active_after_midnight_on_same_day_schedule() {
        let slots = build_slots(&at(12, 0, 0));
        // After-midnight rows are dated on the build day, so they sit before the evening.
        let midnight = New_York
            .with_ymd_and_hms(2026, 10, 31, 0, 0, 0)
            .single()
            .expect("valid");
        assert!(active_slot(&midnight, &slots).is_none());
        assert!(next_boundary(&midnight, &slots).is_none());
    }
}
