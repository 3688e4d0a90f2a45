use crate::models::{NewNotification, NotificationKind, PendingDeadline};
use crate::store::LegalStore;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

/// Deadlines due within this many days trigger a reminder.
pub const WARNING_WINDOW_DAYS: i64 = 7;

/// Notifications to send and the deadlines they cover.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPlan {
    pub notifications: Vec<NewNotification>,
    pub deadline_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    pub sent: usize,
    pub message: String,
}

pub fn plan_notifications(deadlines: &[PendingDeadline], today: NaiveDate) -> NotificationPlan {
    let mut plan = NotificationPlan {
        notifications: Vec::new(),
        deadline_ids: Vec::new(),
    };

    for pending in deadlines {
        let deadline = &pending.deadline;
        let due = deadline.deadline_date;
        let days_remaining = (due - today).num_days();
        let formatted = due.format("%d/%m/%Y");

        let (title, content, kind) = if (0..=WARNING_WINDOW_DAYS).contains(&days_remaining) {
            (
                "⚠️ Plazo legal próximo a vencer",
                format!(
                    "El plazo \"{}\" para el caso \"{}\" vence en {} días ({}).",
                    deadline.description, pending.cases.title, days_remaining, formatted
                ),
                NotificationKind::Deadline,
            )
        } else if days_remaining < 0 {
            (
                "🚨 Plazo legal vencido",
                format!(
                    "El plazo \"{}\" para el caso \"{}\" venció hace {} días ({}).",
                    deadline.description,
                    pending.cases.title,
                    days_remaining.abs(),
                    formatted
                ),
                NotificationKind::DeadlineExpired,
            )
        } else {
            continue;
        };

        plan.notifications.push(NewNotification {
            user_id: pending.cases.user_id.clone(),
            title: title.to_string(),
            content,
            kind,
            is_read: false,
        });
        plan.deadline_ids.push(deadline.id.clone());
    }

    plan
}

pub struct DeadlineMonitor {
    store: Arc<dyn LegalStore>,
}

impl DeadlineMonitor {
    pub fn new(store: Arc<dyn LegalStore>) -> Self {
        Self { store }
    }

    /// Notifies owners of deadlines that are close or overdue, then flags
    /// those deadlines so they are not notified again.
    pub async fn run(&self, today: NaiveDate) -> Result<MonitorReport> {
        let pending = self.store.pending_deadlines().await?;
        let plan = plan_notifications(&pending, today);
        let sent = plan.notifications.len();

        if sent > 0 {
            self.store.insert_notifications(plan.notifications).await?;
            self.store.mark_deadlines_notified(&plan.deadline_ids).await?;
        }

        log::info!(
            "Deadline monitor checked {} deadlines, sent {} notifications",
            pending.len(),
            sent
        );
        Ok(MonitorReport {
            sent,
            message: format!("Monitoreo completado. Se enviaron {sent} notificaciones de plazos."),
        })
    }
}
