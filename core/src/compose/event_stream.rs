//! Event-stream flags for the supervisor.

use crate::types::EventStream;

use super::OptionString;

/// Flags for an event-stream sub-record, in fixed order. The connect
/// timeout is always emitted; metadata is a single quoted argument of
/// `key=value` pairs sorted by key.
pub fn event_stream_options(es: &EventStream) -> OptionString {
    let mut opts = OptionString::new();
    opts.optional("event-stream-application", non_empty(&es.application))
        .optional("event-stream-environment", non_empty(&es.environment))
        .value("event-stream-connect-timeout", es.connect_timeout);

    let tags = sorted_meta_tags(es);
    if !tags.is_empty() {
        opts.value("event-meta", format!("{:?}", tags.join(" ")));
    }

    opts.optional(
        "event-stream-server-certificate",
        es.server_certificate.as_deref(),
    )
    .optional("event-stream-site", es.site.as_deref())
    .optional("event-stream-token", non_empty(&es.token))
    .optional("event-stream-url", non_empty(&es.url));
    opts
}

/// `key=value` tags ordered by key, independent of map iteration order.
pub fn sorted_meta_tags(es: &EventStream) -> Vec<String> {
    let mut keys: Vec<&String> = es.meta.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("{}={}", k, es.meta[k]))
        .collect()
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
