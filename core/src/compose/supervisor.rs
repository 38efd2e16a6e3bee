//! Supervisor `hab sup run` options.

use crate::types::ProvisionerConfig;

use super::event_stream::event_stream_options;
use super::OptionString;

/// Trailing flag appended to every supervisor option string.
pub const NO_COLOR: &str = "no-color";

/// Compose the supervisor options from `cfg`.
///
/// Field order is fixed: permanent peer, listen addresses, peers, ring,
/// url, channel, events, org, http-disable, auto-update, event stream,
/// and `--no-color` last.
pub fn supervisor_options(cfg: &ProvisionerConfig) -> OptionString {
    let mut opts = OptionString::new();
    opts.toggle("permanent-peer", cfg.permanent_peer)
        .optional("listen-ctl", cfg.listen_ctl.as_deref())
        .optional("listen-gossip", cfg.listen_gossip.as_deref())
        .optional("listen-http", cfg.listen_http.as_deref())
        .repeated("peer", &cfg.peers)
        .optional("ring", cfg.ring_key.as_deref())
        .optional("url", cfg.url.as_deref())
        .optional("channel", cfg.channel.as_deref())
        .optional("events", cfg.events.as_deref())
        .optional("org", cfg.organization.as_deref())
        .toggle("http-disable", cfg.http_disable)
        .toggle("auto-update", cfg.auto_update);

    if let Some(es) = &cfg.event_stream {
        opts.extend(event_stream_options(es));
    }

    opts.flag(NO_COLOR);
    opts
}
