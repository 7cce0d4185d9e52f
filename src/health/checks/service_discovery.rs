//! Service discovery health checks

use anyhow::bail;

use super::cluster::parse_address;
use crate::config::ServiceRegistrationConfig;
use crate::health::{Ctx, skipped, test, warn};

const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";

/// Runs the `service-discovery` stage body
pub fn diagnose_service_discovery(
    ctx: &Ctx,
    config: Option<&ServiceRegistrationConfig>,
) -> anyhow::Result<()> {
    let Some(config) = config else {
        skipped(ctx, "no service registration configured");
        return Ok(());
    };

    match config.kind.as_str() {
        "consul" => {
            let address = config.address.as_deref().unwrap_or(DEFAULT_CONSUL_ADDRESS);
            let _ = test(ctx, "check-service-address", |_| {
                parse_address(address).map(|_| ())
            });
            let _ = test(ctx, "check-consul-direct-access", |ctx| {
                let url = parse_address(address)?;
                if !is_local_host(url.host_str().unwrap_or_default()) {
                    warn(
                        ctx,
                        format!(
                            "consul address {address} is not a local agent; \
                             connecting directly to consul servers is not recommended"
                        ),
                    );
                }
                Ok(())
            });
        }
        "kubernetes" => {
            skipped(ctx, "kubernetes service registration needs no address");
        }
        other => bail!("unknown service registration type {other:?}"),
    }
    Ok(())
}

fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckStatus, Session, Sink};

    fn run(config: Option<ServiceRegistrationConfig>) -> crate::health::HealthCheckReport {
        let session = Session::new(Sink::discard());
        let ctx = session.ctx();
        let _ = test(&ctx, "service-discovery", |ctx| {
            diagnose_service_discovery(ctx, config.as_ref())
        });
        session.finalize()
    }

    #[test]
    fn test_absent_registration_is_skipped() {
        let report = run(None);
        let node = report.find(&["service-discovery"]).unwrap();
        assert_eq!(node.status, CheckStatus::Skipped);
        assert_eq!(node.messages, ["no service registration configured"]);
        assert_eq!(report.status(), CheckStatus::Skipped);
    }

    #[test]
    fn test_remote_consul_warns() {
        let report = run(Some(ServiceRegistrationConfig {
            kind: "consul".to_string(),
            address: Some("https://consul.internal:8500".to_string()),
        }));
        assert_eq!(report.status(), CheckStatus::Warn);
        assert_eq!(
            report
                .find(&["service-discovery", "check-service-address"])
                .unwrap()
                .status,
            CheckStatus::Ok
        );
    }

    #[test]
    fn test_unknown_type_fails() {
        let report = run(Some(ServiceRegistrationConfig {
            kind: "zookeeper".to_string(),
            address: None,
        }));
        assert_eq!(report.status(), CheckStatus::Fail);
    }
}
