use crate::connection::{Gateway, HttpMethod};
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use crate::pagination::collect_collection;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Locally authored description of one calendar event.
///
/// Matches the local `calendar.json` layout: a date plus wall-clock start and
/// end times, combined into RFC 3339 timestamps when the payload is built.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CalendarEventSpec {
    pub title: String,
    pub date: String,
    pub time: String,
    pub etime: String,
    pub description: String,
}

/// Synchronizes the course calendar: the remote window is wiped and rebuilt
/// from the locally authored event list. Re-running is idempotent because
/// the wipe removes whatever the previous run created.
pub struct CalendarSync<'a> {
    gateway: &'a dyn Gateway,
    credentials: &'a ApiCredentials,
}

impl<'a> CalendarSync<'a> {
    pub fn new(gateway: &'a dyn Gateway, credentials: &'a ApiCredentials) -> Self {
        CalendarSync {
            gateway,
            credentials,
        }
    }

    fn events_url(&self) -> String {
        format!("{}/calendar_events", self.credentials.api_base())
    }

    /// Creates a new calendar event for the configured course. Success is
    /// the creation status code; anything else is a write error.
    pub fn create_event(&self, event: &CalendarEventSpec) -> Result<(), SyncError> {
        let payload = json!({
            "calendar_event": {
                "context_code": self.credentials.course_context_code(),
                "title": event.title,
                "description": event.description,
                "start_at": format!("{}T{}:00Z", event.date, event.time),
                "end_at": format!("{}T{}:00Z", event.date, event.etime),
            }
        });

        let response = self
            .gateway
            .execute(HttpMethod::Post(payload), &self.events_url(), &[])?;
        if response.status != 201 {
            return Err(SyncError::RemoteWrite {
                status: response.status,
                body: response.body,
            });
        }
        info!(
            "Event '{}' created successfully for {} at {}.",
            event.title, event.date, event.time
        );
        Ok(())
    }

    /// Deletes a specific calendar event.
    ///
    /// 204 is the normal outcome. Some servers answer 200 with the event
    /// record instead; that is accepted only when the record's workflow
    /// state says the event is already deleted, otherwise it is a write
    /// error like any other unexpected status.
    pub fn delete_event(&self, event_id: u64) -> Result<(), SyncError> {
        let url = format!("{}/{}", self.events_url(), event_id);
        let response = self.gateway.execute(HttpMethod::Delete, &url, &[])?;

        match response.status {
            204 => {
                info!("Event {} deleted successfully.", event_id);
                Ok(())
            }
            200 => {
                let record: Value = response.json()?;
                if record["workflow_state"].as_str() == Some("deleted") {
                    warn!("Event {} is already deleted. Skipping.", event_id);
                    Ok(())
                } else {
                    Err(SyncError::RemoteWrite {
                        status: 200,
                        body: format!(
                            "Failed to delete event {}: Unexpected workflow state.",
                            event_id
                        ),
                    })
                }
            }
            status => Err(SyncError::RemoteWrite {
                status,
                body: response.body,
            }),
        }
    }

    /// Deletes every event of the course inside the given date window,
    /// skipping events the server already reports as deleted.
    pub fn delete_all_events(&self, start_date: &str, end_date: &str) -> Result<(), SyncError> {
        let params = vec![
            (
                "context_codes[]".to_string(),
                self.credentials.course_context_code(),
            ),
            ("type".to_string(), "event".to_string()),
            ("per_page".to_string(), "100".to_string()),
            ("start_date".to_string(), start_date.to_string()),
            ("end_date".to_string(), end_date.to_string()),
        ];
        let events = collect_collection(self.gateway, &self.events_url(), &params)?;

        for event in events {
            let id = match event["id"].as_u64() {
                Some(id) => id,
                None => continue,
            };
            if event["workflow_state"].as_str() == Some("deleted") {
                warn!("Skipping event {} as it is already deleted.", id);
                continue;
            }
            self.delete_event(id)?;
        }
        Ok(())
    }

    /// Replaces the course calendar inside the window with the given events,
    /// preserving their order.
    pub fn replace_calendar(
        &self,
        events: &[CalendarEventSpec],
        start_date: &str,
        end_date: &str,
    ) -> Result<(), SyncError> {
        self.delete_all_events(start_date, end_date)?;
        for event in events {
            self.create_event(event)?;
        }
        Ok(())
    }
}
