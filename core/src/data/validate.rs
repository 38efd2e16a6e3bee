//! Configuration fault collection.
//!
//! Every check pushes into one `Faults` batch so a document with several
//! problems reports all of them at once, before anything touches a host.

use std::str::FromStr;

use serde_yaml::Value;
use url::Url;

use crate::error::{ConfigFault, ProvisionError};
use crate::types::service::key_name;
use crate::types::EventStream;

#[derive(Debug, Default)]
pub struct Faults {
    faults: Vec<ConfigFault>,
}

impl Faults {
    pub fn new() -> Self {
        Faults::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.faults.push(ConfigFault::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// `Ok(value)` when no fault was recorded, otherwise the whole batch.
    pub fn finish<T>(self, value: T) -> Result<T, ProvisionError> {
        if self.faults.is_empty() {
            Ok(value)
        } else {
            Err(ProvisionError::Config(self.faults))
        }
    }

    /// Parse an optional field, recording a fault when it does not parse.
    pub fn parse<T>(&mut self, field: &str, value: Option<&str>) -> Option<T>
    where
        T: FromStr<Err = String>,
    {
        match value?.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                self.push(field, e);
                None
            }
        }
    }

    /// URLs must carry a scheme.
    pub fn url(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            if let Err(e) = Url::parse(v) {
                self.push(field, format!("invalid URL '{}': {}", v, e));
            }
        }
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.push(field, "is required");
        }
    }

    /// Key content is only importable under a key name.
    pub fn ring_key(&mut self, ring_key: Option<&str>, content: Option<&str>) {
        let set = |v: Option<&str>| v.is_some_and(|v| !v.is_empty());
        if set(content) && !set(ring_key) {
            self.push("ring_key", "must be set when ring_key_content is given");
        }
    }

    /// A service key is placed under the name on its second line.
    pub fn key_name(&mut self, field: &str, key: Option<&str>) {
        if let Some(k) = key.filter(|k| !k.is_empty()) {
            if key_name(k).is_none() {
                self.push(field, "must name the key on its second line");
            }
        }
    }

    pub fn event_stream(&mut self, es: &EventStream) {
        self.required("event_stream.application", &es.application);
        self.required("event_stream.environment", &es.environment);
        self.required("event_stream.token", &es.token);
        self.required("event_stream.url", &es.url);
        self.url("event_stream.url", Some(&es.url));
    }
}


// ---------------------------------------------------------------------------
// Shape checks
// ---------------------------------------------------------------------------

fn expect_sequence(faults: &mut Faults, field: &str, value: Option<&Value>) {
    if let Some(v) = value {
        if !v.is_null() && !v.is_sequence() {
            faults.push(field, "must be a list of blocks");
        }
    }
}

fn expect_mapping(faults: &mut Faults, field: &str, value: Option<&Value>) {
    if let Some(v) = value {
        if !v.is_null() && !v.is_mapping() {
            faults.push(field, "must be a block");
        }
    }
}

/// Check that list- and map-typed fields have the right shape before
/// deserialising. Returns the faults found.
pub fn check_shape(doc: &Value) -> Faults {
    let mut faults = Faults::new();
    if !doc.is_mapping() && !doc.is_null() {
        faults.push("document", "must be a mapping");
        return faults;
    }

    expect_sequence(&mut faults, "peers", doc.get("peers"));
    expect_mapping(&mut faults, "event_stream", doc.get("event_stream"));
    if let Some(es) = doc.get("event_stream").filter(|v| v.is_mapping()) {
        expect_mapping(&mut faults, "event_stream.meta", es.get("meta"));
    }
    expect_mapping(&mut faults, "settings", doc.get("settings"));

    expect_sequence(&mut faults, "services", doc.get("services"));
    if let Some(services) = doc.get("services").and_then(Value::as_sequence) {
        for (i, svc) in services.iter().enumerate() {
            if !svc.is_mapping() {
                faults.push(format!("services[{}]", i), "must be a block");
                continue;
            }
            expect_sequence(&mut faults, &format!("services[{}].binds", i), svc.get("binds"));
            expect_sequence(&mut faults, &format!("services[{}].bind", i), svc.get("bind"));
        }
    }
    faults
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bind;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn well_shaped_document() {
        let doc = yaml(
            "peers: [1.2.3.4]\nservices:\n  - name: core/redis\n    binds: [\"a:b.c\"]\nevent_stream:\n  meta: {k: v}\n",
        );
        assert!(check_shape(&doc).is_empty());
    }

    #[test]
    fn scalar_where_list_expected() {
        let doc = yaml("services: core/vault\npeers: 1.2.3.4\n");
        let err = check_shape(&doc).finish(()).unwrap_err();
        match err {
            ProvisionError::Config(faults) => {
                assert_eq!(faults.len(), 2);
                assert_eq!(faults[0].to_string(), "peers: must be a list of blocks");
                assert_eq!(faults[1].to_string(), "services: must be a list of blocks");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_shapes() {
        let doc = yaml("services:\n  - name: core/redis\n    binds: \"a:b.c\"\n  - just-a-string\nevent_stream:\n  meta: [a, b]\n");
        let faults = check_shape(&doc);
        assert_eq!(faults.len(), 3);
    }

    #[test]
    fn url_requires_scheme() {
        let mut faults = Faults::new();
        faults.url("url", Some("https://bldr.example.com"));
        assert!(faults.is_empty());
        faults.url("url", Some("bldr.example.com"));
        faults.url("url", None);
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn ring_key_needs_name() {
        let mut faults = Faults::new();
        faults.ring_key(Some("foo"), Some("SYM-SEC-1\nfoo\n"));
        faults.ring_key(None, None);
        faults.ring_key(Some(""), Some(""));
        assert!(faults.is_empty());
        faults.ring_key(Some(""), Some("SYM-SEC-1\nfoo\n"));
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn key_name_on_second_line() {
        let mut faults = Faults::new();
        faults.key_name("services[0].service_key", Some("BOX-SEC-1\nredis.default@org\n"));
        faults.key_name("services[0].service_key", None);
        assert!(faults.is_empty());
        faults.key_name("services[0].service_key", Some("single-line-key"));
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn parse_records_fault() {
        let mut faults = Faults::new();
        let ok: Option<Bind> = faults.parse("binds[0]", Some("backend:bar.default"));
        assert!(ok.is_some());
        let bad: Option<Bind> = faults.parse("binds[1]", Some("backend:bar"));
        assert!(bad.is_none());
        let absent: Option<Bind> = faults.parse("binds[2]", None);
        assert!(absent.is_none());
        assert_eq!(faults.len(), 1);
    }
}
