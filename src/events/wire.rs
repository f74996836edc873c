//! Protobuf envelope for handing events to the notification collaborator.

use prost::Message;

use crate::models::event::DomainEvent;

#[derive(Clone, PartialEq, Message)]
pub struct EventEnvelope {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(string, repeated, tag = "3")]
    pub recipients: Vec<String>,
    #[prost(string, tag = "4")]
    pub entity_id: String,
    #[prost(string, optional, tag = "5")]
    pub actor_id: Option<String>,
    #[prost(int64, tag = "6")]
    pub occurred_at_millis: i64,
}

impl From<&DomainEvent> for EventEnvelope {
    fn from(event: &DomainEvent) -> Self {
        Self {
            id: event.id.to_string(),
            kind: event.kind.as_str().to_string(),
            recipients: event.recipients.iter().map(|id| id.to_string()).collect(),
            entity_id: event.entity_id.to_string(),
            actor_id: event.actor_id.map(|id| id.to_string()),
            occurred_at_millis: event.occurred_at.timestamp_millis(),
        }
    }
}

pub fn encode_event(event: &DomainEvent) -> Vec<u8> {
    EventEnvelope::from(event).encode_to_vec()
}
