//! The policy prelude injected ahead of user code.
//!
//! Determinism, network policy, console capture, and the global
//! allow-list are all applied inside the evaluation context. Every run
//! builds a fresh context, so overrides are scoped to the call on every
//! exit path by construction.

use tier0::{RuntimePolicy, SandboxConfig};

/// Pinned wall clock for deterministic mode: 2024-01-01T00:00:00Z.
pub const DETERMINISTIC_EPOCH_MS: u64 = 1_704_067_200_000;

/// Globals the allow-list can grant. Names outside the granted set are
/// shadowed to `undefined` inside the context.
const GATED_GLOBALS: &[&str] = &[
    "setTimeout",
    "setInterval",
    "clearTimeout",
    "clearInterval",
    "queueMicrotask",
    "fetch",
    "console",
];

/// Build the prelude script for one run.
pub fn build_prelude(config: &SandboxConfig) -> String {
    let mut prelude = String::new();

    // Console capture: user logs are collected and surfaced with the
    // outcome rather than dropped.
    prelude.push_str(
        "var __logs__ = [];\n\
         globalThis.console = {\n\
           log: function(){ __logs__.push(Array.prototype.slice.call(arguments).map(String).join(' ')); },\n\
           warn: function(){ __logs__.push(Array.prototype.slice.call(arguments).map(String).join(' ')); },\n\
           error: function(){ __logs__.push(Array.prototype.slice.call(arguments).map(String).join(' ')); }\n\
         };\n",
    );

    if config.deterministic {
        prelude.push_str(&format!(
            "(function(){{\n\
               var RealDate = Date;\n\
               var FIXED = {DETERMINISTIC_EPOCH_MS};\n\
               function PinnedDate() {{\n\
                 if (arguments.length === 0) {{ return new RealDate(FIXED); }}\n\
                 return new (Function.prototype.bind.apply(RealDate, [null].concat(Array.prototype.slice.call(arguments))))();\n\
               }}\n\
               PinnedDate.now = function() {{ return FIXED; }};\n\
               PinnedDate.parse = RealDate.parse;\n\
               PinnedDate.UTC = RealDate.UTC;\n\
               PinnedDate.prototype = RealDate.prototype;\n\
               globalThis.Date = PinnedDate;\n\
               Math.random = function() {{ return 0.5; }};\n\
             }})();\n"
        ));
    }

    prelude.push_str(&build_fetch_policy(&config.policy));

    if let Some(allowed) = &config.allowed_globals {
        for name in GATED_GLOBALS {
            if !allowed.iter().any(|a| a == name) && *name != "fetch" && *name != "console" {
                prelude.push_str(&format!("globalThis.{name} = undefined;\n"));
            }
        }
        // fetch stays as the policy thrower regardless of the list;
        // console revocation swaps in a silent sink.
        if !allowed.iter().any(|a| a == "console") {
            prelude.push_str(
                "globalThis.console = { log: function(){}, warn: function(){}, error: function(){} };\n",
            );
        }
    }

    prelude
}

/// The in-context `fetch` that enforces network policy. Denied calls
/// throw; permitted calls surface the isolate's lack of real egress.
fn build_fetch_policy(policy: &RuntimePolicy) -> String {
    if !policy.network_enabled {
        return "globalThis.fetch = function(){ throw new Error('Network access is disabled'); };\n"
            .to_string();
    }

    let allowlist_json =
        serde_json::to_string(&policy.network_allowlist).unwrap_or_else(|_| "[]".into());
    format!(
        "globalThis.fetch = function(url) {{\n\
           var host = String(url).replace(/^[a-z]+:\\/\\//i, '').split('/')[0].split(':')[0];\n\
           var allowed = {allowlist_json};\n\
           var ok = allowed.length === 0 || allowed.some(function(entry) {{\n\
             if (entry.indexOf('*.') === 0) {{\n\
               var suffix = entry.slice(1);\n\
               return host.length > suffix.length && host.lastIndexOf(suffix) === host.length - suffix.length;\n\
             }}\n\
             return host === entry;\n\
           }});\n\
           if (!ok) {{ throw new Error('Network access blocked: ' + host); }}\n\
           throw new Error('Network egress is not available in this isolate');\n\
         }};\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_network_throws_disabled() {
        let config = SandboxConfig::default();
        let prelude = build_prelude(&config);
        assert!(prelude.contains("Network access is disabled"));
    }

    #[test]
    fn allowlist_embeds_entries() {
        let mut config = SandboxConfig::default();
        config.policy.network_enabled = true;
        config.policy.network_allowlist = vec!["api.example.com".into(), "*.trusted.io".into()];
        let prelude = build_prelude(&config);
        assert!(prelude.contains("api.example.com"));
        assert!(prelude.contains("*.trusted.io"));
        assert!(prelude.contains("Network access blocked"));
    }

    #[test]
    fn deterministic_pins_clock_and_random() {
        let config = SandboxConfig {
            deterministic: true,
            ..SandboxConfig::default()
        };
        let prelude = build_prelude(&config);
        assert!(prelude.contains("1704067200000"));
        assert!(prelude.contains("Math.random"));
    }

    #[test]
    fn allow_list_shadows_absent_globals() {
        let config = SandboxConfig {
            allowed_globals: Some(vec!["console".into()]),
            ..SandboxConfig::default()
        };
        let prelude = build_prelude(&config);
        assert!(prelude.contains("globalThis.setTimeout = undefined;"));
        assert!(prelude.contains("globalThis.setInterval = undefined;"));
    }
}
