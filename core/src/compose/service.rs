//! Per-service `hab pkg install` and `hab svc load` options.

use crate::types::Service;

use super::OptionString;

/// Options for the explicit package install: channel, then url.
pub fn install_options(service: &Service) -> OptionString {
    let mut opts = OptionString::new();
    opts.optional("channel", service.channel.as_deref())
        .optional("url", service.url.as_deref());
    opts
}

/// Options for `hab svc load`: topology, strategy, channel, url, group,
/// then one `--bind` per bind in list order.
pub fn load_options(service: &Service) -> OptionString {
    let mut opts = OptionString::new();
    opts.optional("topology", service.topology.map(|t| t.as_str()))
        .optional("strategy", service.strategy.map(|s| s.as_str()))
        .optional("channel", service.channel.as_deref())
        .optional("url", service.url.as_deref())
        .optional("group", service.group.as_deref())
        .repeated("bind", &service.binds);
    opts
}
