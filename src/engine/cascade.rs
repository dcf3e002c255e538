use ulid::Ulid;

use crate::config::ReactivationPolicy;
use crate::model::*;

// ── Cascade rules ─────────────────────────────────────────────────
//
// Pure transformations: current assignments + entity event → new
// assignments. The caller persists whatever changed.
//
// Going down: active assignments of the entity become inactive and are
// marked as held by it. Assignments already held by the other entity get
// the extra mark too, so they only come back once both are up again.
//
// Coming up: under `RestoreAll` every assignment of the entity becomes
// active. Under `RestoreCascaded` the entity's mark is cleared and only
// assignments with no remaining mark are reactivated; hand-deactivated
// assignments stay as they are.

#[derive(Clone, Copy)]
enum Holder {
    Room,
    ProviderLink,
}

fn mark(s: &mut Suspension, holder: Holder) {
    match holder {
        Holder::Room => s.room = true,
        Holder::ProviderLink => s.provider_link = true,
    }
}

fn unmark(s: &mut Suspension, holder: Holder) {
    match holder {
        Holder::Room => s.room = false,
        Holder::ProviderLink => s.provider_link = false,
    }
}

fn suspend(a: &mut Assignment, holder: Holder) {
    if a.is_active() {
        a.state = AssignmentState::Inactive;
        a.suspension = Suspension::default();
        mark(&mut a.suspension, holder);
    } else if !a.suspension.is_empty() {
        mark(&mut a.suspension, holder);
    }
}

fn restore(a: &mut Assignment, holder: Holder, policy: ReactivationPolicy) {
    match policy {
        ReactivationPolicy::RestoreAll => a.activate(),
        ReactivationPolicy::RestoreCascaded => {
            if a.is_active() || a.suspension.is_empty() {
                return;
            }
            unmark(&mut a.suspension, holder);
            if a.suspension.is_empty() {
                a.activate();
            }
        }
    }
}

fn apply(
    mut assignments: Vec<Assignment>,
    matches: impl Fn(&Assignment) -> bool,
    going_up: bool,
    holder: Holder,
    policy: ReactivationPolicy,
) -> Vec<Assignment> {
    for a in assignments.iter_mut().filter(|a| matches(a)) {
        if going_up {
            restore(a, holder, policy);
        } else {
            suspend(a, holder);
        }
    }
    assignments
}

/// Propagate a room state change onto `assignments`. Assignments of other
/// rooms pass through untouched.
pub fn on_room_state_change(
    room_id: Ulid,
    new_state: RoomState,
    assignments: Vec<Assignment>,
    policy: ReactivationPolicy,
) -> Vec<Assignment> {
    apply(
        assignments,
        |a| a.room_id == room_id,
        new_state == RoomState::Active,
        Holder::Room,
        policy,
    )
}

/// Propagate a provider-link state change onto `assignments`.
pub fn on_provider_link_state_change(
    link_id: Ulid,
    new_state: LinkState,
    assignments: Vec<Assignment>,
    policy: ReactivationPolicy,
) -> Vec<Assignment> {
    apply(
        assignments,
        |a| a.link_id == link_id,
        new_state == LinkState::Active,
        Holder::ProviderLink,
        policy,
    )
}

/// Drop every assignment of a deleted room, whatever its state.
pub fn on_room_deleted(room_id: Ulid, mut assignments: Vec<Assignment>) -> Vec<Assignment> {
    assignments.retain(|a| a.room_id != room_id);
    assignments
}

pub fn on_provider_link_deleted(link_id: Ulid, mut assignments: Vec<Assignment>) -> Vec<Assignment> {
    assignments.retain(|a| a.link_id != link_id);
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use ReactivationPolicy::*;

    struct Fixture {
        room: Ulid,
        other_room: Ulid,
        link: Ulid,
        other_link: Ulid,
    }

    fn fixture() -> Fixture {
        Fixture {
            room: Ulid::new(),
            other_room: Ulid::new(),
            link: Ulid::new(),
            other_link: Ulid::new(),
        }
    }

    fn mk(room: Ulid, link: Ulid, day: DayOfWeek, state: AssignmentState) -> Assignment {
        let mut a = Assignment::new(
            Ulid::new(),
            room,
            link,
            day,
            Window::new(TimeOfDay::hm(8, 0).unwrap(), TimeOfDay::hm(12, 0).unwrap()),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        a.state = state;
        a
    }

    fn sample(f: &Fixture) -> Vec<Assignment> {
        vec![
            mk(f.room, f.link, DayOfWeek::Monday, AssignmentState::Active),
            mk(f.room, f.other_link, DayOfWeek::Tuesday, AssignmentState::Active),
            mk(f.room, f.link, DayOfWeek::Wednesday, AssignmentState::Inactive),
            mk(f.other_room, f.link, DayOfWeek::Monday, AssignmentState::Active),
        ]
    }

    fn states(v: &[Assignment]) -> Vec<AssignmentState> {
        v.iter().map(|a| a.state).collect()
    }

    use AssignmentState::{Active as On, Inactive as Off};

    #[test]
    fn maintenance_deactivates_room_assignments_only() {
        let f = fixture();
        let out = on_room_state_change(f.room, RoomState::Maintenance, sample(&f), RestoreAll);
        assert_eq!(states(&out), vec![Off, Off, Off, On]);
        assert!(out[0].suspension.room);
        assert!(out[1].suspension.room);
        // Hand-deactivated assignment is not marked as held by the room.
        assert!(out[2].suspension.is_empty());
        assert!(out[3].suspension.is_empty());
    }

    #[test]
    fn inactive_room_behaves_like_maintenance() {
        let f = fixture();
        let a = on_room_state_change(f.room, RoomState::Maintenance, sample(&f), RestoreAll);
        let b = on_room_state_change(f.room, RoomState::Inactive, sample(&f), RestoreAll);
        assert_eq!(states(&a), states(&b));
    }

    #[test]
    fn cascade_is_idempotent() {
        let f = fixture();
        for policy in [RestoreAll, RestoreCascaded] {
            let once = on_room_state_change(f.room, RoomState::Maintenance, sample(&f), policy);
            let twice = on_room_state_change(f.room, RoomState::Maintenance, once.clone(), policy);
            assert_eq!(once, twice);

            let up_once = on_room_state_change(f.room, RoomState::Active, once.clone(), policy);
            let up_twice = on_room_state_change(f.room, RoomState::Active, up_once.clone(), policy);
            assert_eq!(up_once, up_twice);
        }
    }

    #[test]
    fn restore_all_reactivates_everything_on_the_room() {
        let f = fixture();
        let down = on_room_state_change(f.room, RoomState::Maintenance, sample(&f), RestoreAll);
        let up = on_room_state_change(f.room, RoomState::Active, down, RestoreAll);
        // Including the one that was off before the outage.
        assert_eq!(states(&up), vec![On, On, On, On]);
        assert!(up.iter().all(|a| a.suspension.is_empty()));
    }

    #[test]
    fn restore_cascaded_keeps_manual_deactivation() {
        let f = fixture();
        let before = sample(&f);
        let down = on_room_state_change(f.room, RoomState::Maintenance, before.clone(), RestoreCascaded);
        let up = on_room_state_change(f.room, RoomState::Active, down, RestoreCascaded);
        assert_eq!(states(&up), vec![On, On, Off, On]);
        assert_eq!(up, before);
    }

    #[test]
    fn restore_cascaded_waits_for_both_holders() {
        let f = fixture();
        let v = sample(&f);
        let v = on_room_state_change(f.room, RoomState::Maintenance, v, RestoreCascaded);
        let v = on_provider_link_state_change(f.link, LinkState::Inactive, v, RestoreCascaded);
        assert!(v[0].suspension.room && v[0].suspension.provider_link);
        assert_eq!(v[3].state, Off);
        assert!(v[3].suspension.provider_link && !v[3].suspension.room);

        // Room back: link still down, so the Monday assignment stays off.
        let v = on_room_state_change(f.room, RoomState::Active, v, RestoreCascaded);
        assert_eq!(states(&v), vec![Off, On, Off, Off]);

        let v = on_provider_link_state_change(f.link, LinkState::Active, v, RestoreCascaded);
        assert_eq!(states(&v), vec![On, On, Off, On]);
    }

    #[test]
    fn link_cascade() {
        let f = fixture();
        let down = on_provider_link_state_change(f.link, LinkState::Inactive, sample(&f), RestoreAll);
        assert_eq!(states(&down), vec![Off, On, Off, Off]);
        let up = on_provider_link_state_change(f.link, LinkState::Active, down, RestoreAll);
        assert_eq!(states(&up), vec![On, On, On, On]);
    }

    #[test]
    fn deletion_removes_all_states() {
        let f = fixture();
        let before = sample(&f);
        let left = on_room_deleted(f.room, before.clone());
        assert_eq!(left, vec![before[3].clone()]);

        let left = on_provider_link_deleted(f.link, before.clone());
        assert_eq!(left, vec![before[1].clone()]);
    }
}
