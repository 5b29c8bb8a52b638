use spegel_key::upstream_host_for;

/// One mirror endpoint to list in a generated `hosts.toml`, in the order they should be tried.
#[derive(Debug, Clone)]
pub struct MirrorEndpoint {
    pub url: String,
}

/// Renders the containerd `hosts.toml` fallback file for `registry`, listing `mirrors` in order.
/// Deterministic: the same `(registry, mirrors)` always renders byte-identical output, and
/// regenerating after removing then re-adding the same mirror list reproduces the same bytes —
/// there's no hidden ordering or timestamp dependency.
///
/// The first mirror is assumed to be this node; every mirror after it additionally gets
/// `X-Spegel-External = ["true"]`, since a request this node forwards to a second mirror must be
/// marked external so that mirror never tries to resolve it again through the substrate.
pub fn render(registry: &str, mirrors: &[MirrorEndpoint]) -> String {
    let mut out = String::new();
    out.push_str(&format!("server = \"https://{}\"\n", upstream_host_for(registry)));
    for (i, mirror) in mirrors.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("[host.\"{}\"]\n", mirror.url));
        out.push_str("  capabilities = [\"pull\", \"resolve\"]\n\n");
        out.push_str(&format!("[host.\"{}\".header]\n", mirror.url));
        out.push_str(&format!("  X-Spegel-Registry = [\"{}\"]\n", registry));
        out.push_str("  X-Spegel-Mirror = [\"true\"]\n");
        if i > 0 {
            out.push_str("  X-Spegel-External = [\"true\"]\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_io_server_line_rewrites_to_upstream_host() {
        let rendered = render("docker.io", &[]);
        assert!(rendered.starts_with("server = \"https://registry-1.docker.io\"\n"));
    }

    #[test]
    fn other_registries_keep_their_host_unchanged() {
        let rendered = render("ghcr.io", &[]);
        assert!(rendered.starts_with("server = \"https://ghcr.io\"\n"));
    }

    #[test]
    fn second_mirror_onward_is_marked_external() {
        let mirrors = vec![
            MirrorEndpoint {
                url: "http://127.0.0.1:5000".to_string(),
            },
            MirrorEndpoint {
                url: "http://127.0.0.1:5001".to_string(),
            },
        ];
        let rendered = render("example.com", &mirrors);
        let first_block_end = rendered.find("http://127.0.0.1:5001").unwrap();
        assert!(!rendered[..first_block_end].contains("X-Spegel-External"));
        assert!(rendered[first_block_end..].contains("X-Spegel-External = [\"true\"]"));
    }

    #[test]
    fn rendering_is_deterministic_across_repeated_calls() {
        let mirrors = vec![MirrorEndpoint {
            url: "http://127.0.0.1:5000".to_string(),
        }];
        assert_eq!(render("example.com", &mirrors), render("example.com", &mirrors));
    }
}
