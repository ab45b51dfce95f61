//! KDL configuration parser

use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl depends on an older miette, so rebuild the span for ours
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(content, node)?;
            }
            "niri" => {
                config.niri = parse_niri(content, node)?;
            }
            "display" => {
                config.displays.push(parse_display(node)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

/// An `Invalid` error pointing at `node` in the source
fn invalid(content: &str, node: &kdl::KdlNode, message: String) -> ConfigError {
    let span = node.span();
    ConfigError::Invalid {
        message,
        src: content.to_string(),
        span: miette::SourceSpan::from((span.offset(), span.len())),
    }
}

fn parse_global(content: &str, node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(val) = first_string(child) {
                        global.log_level = val
                            .parse()
                            .map_err(|e| invalid(content, child, e))?;
                    }
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_niri(content: &str, node: &kdl::KdlNode) -> Result<NiriConfig, ConfigError> {
    let mut niri = NiriConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "socket-path" => {
                    if let Some(val) = first_string(child) {
                        niri.socket_path = Some(shellexpand::tilde(val).into_owned().into());
                    }
                }
                "reconnect-delay-ms" => {
                    let ms = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_i64())
                        .ok_or_else(|| {
                            invalid(
                                content,
                                child,
                                "reconnect-delay-ms expects an integer".to_string(),
                            )
                        })?;
                    if ms <= 0 {
                        return Err(invalid(
                            content,
                            child,
                            format!("reconnect-delay-ms must be positive, got {}", ms),
                        ));
                    }
                    niri.reconnect_delay = Duration::from_millis(ms as u64);
                }
                name => {
                    tracing::warn!("Unknown niri config option: {}", name);
                }
            }
        }
    }

    Ok(niri)
}

fn parse_display(node: &kdl::KdlNode) -> Result<DisplayHint, ConfigError> {
    let display = first_string(node).map(|s| s.to_string()).ok_or_else(|| {
        ConfigError::MissingField {
            field: "display name (e.g., `display \"LS27AG55x\" { ... }`)".to_string(),
        }
    })?;

    let mut output = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "output" => {
                    output = first_string(child).map(|s| s.to_string());
                }
                name => {
                    tracing::warn!("Unknown display config option: {}", name);
                }
            }
        }
    }

    let output = output.ok_or_else(|| ConfigError::MissingField {
        field: format!("output for display '{}'", display),
    })?;

    Ok(DisplayHint { display, output })
}
