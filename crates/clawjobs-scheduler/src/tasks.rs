//! Task → timer planning. Decides which timer shape a task gets and how
//! it treats an existing timer under the same job name.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use clawjobs_core::types::{Schedule, Task};

use crate::delay::{daily_delay, weekly_delay};
use crate::timer::{ExistingPolicy, TimerPlan, TimerSpec};

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(24 * 3600);
const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// Timer plan for `task` at `now`, or `None` for a disabled task.
///
/// | schedule | timer | first fire | period | on existing |
/// |----------|-------|------------|--------|-------------|
/// | one-time | once  | `max(0, run_at - now)` | — | replace |
/// | interval | every | immediately | `max(1, hours)` h | update |
/// | daily    | every | next `hh:mm` | 24 h | update |
/// | weekly   | every | next weekday `hh:mm` | 7 d | update |
pub fn plan<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>) -> Option<TimerPlan> {
    if !task.enabled {
        return None;
    }

    let plan = match &task.schedule {
        Schedule::OneTime { run_at } => {
            let delay = (*run_at - now.with_timezone(&Utc))
                .to_std()
                .unwrap_or_default();
            TimerPlan {
                spec: TimerSpec::Once { delay },
                policy: ExistingPolicy::Replace,
            }
        }
        Schedule::Interval { hours } => periodic(Duration::ZERO, HOUR * (*hours).max(1)),
        Schedule::Daily { hour, minute } => periodic(daily_delay(*hour, *minute, now), DAY),
        Schedule::Weekly {
            day_of_week,
            hour,
            minute,
        } => periodic(weekly_delay(*day_of_week, *hour, *minute, now), WEEK),
    };
    Some(plan)
}

fn periodic(initial_delay: Duration, period: Duration) -> TimerPlan {
    TimerPlan {
        spec: TimerSpec::Every {
            initial_delay,
            period,
        },
        policy: ExistingPolicy::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2026, 2, 23, 8, 0, 0).unwrap()
    }

    fn task(schedule: Schedule) -> Task {
        Task::new("t", "p", schedule)
    }

    #[test]
    fn test_disabled_task_has_no_plan() {
        let mut t = task(Schedule::Interval { hours: 2 });
        t.enabled = false;
        assert!(plan(&t, &now()).is_none());
    }

    #[test]
    fn test_one_time_future_and_past() {
        let future = task(Schedule::OneTime {
            run_at: now() + chrono::Duration::minutes(90),
        });
        assert_eq!(
            plan(&future, &now()),
            Some(TimerPlan {
                spec: TimerSpec::Once {
                    delay: Duration::from_secs(90 * 60)
                },
                policy: ExistingPolicy::Replace,
            })
        );

        let past = task(Schedule::OneTime {
            run_at: now() - chrono::Duration::hours(3),
        });
        let p = plan(&past, &now()).unwrap();
        assert_eq!(p.spec, TimerSpec::Once { delay: Duration::ZERO });
    }

    #[test]
    fn test_interval_starts_immediately_and_floors_period() {
        let p = plan(&task(Schedule::Interval { hours: 6 }), &now()).unwrap();
        assert_eq!(
            p.spec,
            TimerSpec::Every {
                initial_delay: Duration::ZERO,
                period: 6 * HOUR
            }
        );
        assert_eq!(p.policy, ExistingPolicy::Update);

        let zero = plan(&task(Schedule::Interval { hours: 0 }), &now()).unwrap();
        assert_eq!(
            zero.spec,
            TimerSpec::Every {
                initial_delay: Duration::ZERO,
                period: HOUR
            }
        );
    }

    #[test]
    fn test_daily_uses_delay_calculator() {
        let p = plan(&task(Schedule::Daily { hour: 9, minute: 30 }), &now()).unwrap();
        assert_eq!(
            p.spec,
            TimerSpec::Every {
                initial_delay: Duration::from_secs(90 * 60),
                period: DAY
            }
        );
    }

    #[test]
    fn test_weekly_uses_delay_calculator() {
        let t = task(Schedule::Weekly {
            day_of_week: 3,
            hour: 8,
            minute: 0,
        });
        let p = plan(&t, &now()).unwrap();
        assert_eq!(
            p.spec,
            TimerSpec::Every {
                initial_delay: 2 * DAY,
                period: WEEK
            }
        );
        assert_eq!(p.policy, ExistingPolicy::Update);
    }
}
