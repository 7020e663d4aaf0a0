use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::options::{CertChainOptions, ProtocolVersion, Role, VerifyMode};
use super::timer::RetransmitTimer;
use crate::core::{ContextSetup, MuxError, MuxResult};
use crate::fault::FaultPolicy;

/// Endpoint configuration.
///
/// Built with [`DtlsConfig::builder`]. Certificate and cipher options are
/// handed to the engine through [`configure_context`](Self::configure_context);
/// timeouts and fault hooks are consumed by the endpoints themselves.
#[derive(Clone)]
pub struct DtlsConfig {
    role: Role,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    ca_certs: Option<PathBuf>,
    cert_chain_options: CertChainOptions,
    verify_mode: VerifyMode,
    protocol: ProtocolVersion,
    ciphers: Vec<String>,
    curves: Vec<String>,
    sigalgs: Vec<String>,
    server_key_exchange_curve: Option<String>,
    mtu: Option<usize>,
    idle_timeout: Option<Duration>,
    retransmit_interval: Option<Duration>,
    wait_timeout: Option<Duration>,
    handshake_on_connect: bool,
    suppress_ragged_eofs: bool,
    engine_logging: bool,
    fault_policy: Option<Arc<dyn FaultPolicy>>,
}

impl DtlsConfig {
    /// Start a configuration for the given role.
    pub fn builder(role: Role) -> DtlsConfigBuilder {
        DtlsConfigBuilder {
            config: DtlsConfig {
                role,
                cert_file: None,
                key_file: None,
                ca_certs: None,
                cert_chain_options: CertChainOptions::NONE,
                verify_mode: VerifyMode::None,
                protocol: ProtocolVersion::default_for(role),
                ciphers: Vec::new(),
                curves: Vec::new(),
                sigalgs: Vec::new(),
                server_key_exchange_curve: None,
                mtu: None,
                idle_timeout: None,
                retransmit_interval: None,
                wait_timeout: None,
                handshake_on_connect: role == Role::Client,
                suppress_ragged_eofs: true,
                engine_logging: false,
                fault_policy: None,
            },
        }
    }

    /// Shorthand for `DtlsConfig::builder(Role::Server)`.
    pub fn server() -> DtlsConfigBuilder {
        Self::builder(Role::Server)
    }

    /// Shorthand for `DtlsConfig::builder(Role::Client)`.
    pub fn client() -> DtlsConfigBuilder {
        Self::builder(Role::Client)
    }

    /// Endpoint role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Certificate chain file.
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    /// Private key file.
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    /// Trusted CA bundle used to verify the peer.
    pub fn ca_certs(&self) -> Option<&Path> {
        self.ca_certs.as_deref()
    }

    /// Flags used when building the local certificate chain.
    pub fn cert_chain_options(&self) -> CertChainOptions {
        self.cert_chain_options
    }

    /// Peer verification mode.
    pub fn verify_mode(&self) -> VerifyMode {
        self.verify_mode
    }

    /// Protocol version selector.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Cipher restriction list (empty = engine default).
    pub fn ciphers(&self) -> &[String] {
        &self.ciphers
    }

    /// Curve restriction list (empty = engine default).
    pub fn curves(&self) -> &[String] {
        &self.curves
    }

    /// Signature algorithm restriction list (empty = engine default).
    pub fn sigalgs(&self) -> &[String] {
        &self.sigalgs
    }

    /// Server ephemeral key-exchange curve.
    pub fn server_key_exchange_curve(&self) -> Option<&str> {
        self.server_key_exchange_curve.as_deref()
    }

    /// Link MTU override.
    pub fn mtu(&self) -> Option<usize> {
        self.mtu
    }

    /// Idle timeout applied to each new server session. `None` never expires.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Handshake retransmission interval, if overridden.
    pub fn retransmit_interval(&self) -> Option<Duration> {
        self.retransmit_interval
    }

    /// Readiness wait (server) or socket timeout (client). `None` blocks.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }

    /// Whether the client runs its handshake as part of connecting.
    pub fn handshake_on_connect(&self) -> bool {
        self.handshake_on_connect
    }

    /// Whether a peer vanishing without close notification is treated as noise.
    pub fn suppress_ragged_eofs(&self) -> bool {
        self.suppress_ragged_eofs
    }

    /// Whether the engine's protocol trace is enabled.
    pub fn engine_logging(&self) -> bool {
        self.engine_logging
    }

    /// Recovery hooks consulted for fatal session faults.
    pub fn fault_policy(&self) -> Option<&Arc<dyn FaultPolicy>> {
        self.fault_policy.as_ref()
    }

    /// Timer callback that enforces the retransmission interval.
    pub fn retransmit_timer(&self) -> RetransmitTimer {
        RetransmitTimer::new(self.retransmit_interval)
    }

    /// Apply the engine-facing options to a context being set up.
    ///
    /// Protocol and verification mode are always installed. Certificates and
    /// trust anchors are loaded when configured, and the chain is built once a
    /// certificate is loaded. Restriction lists are only installed when
    /// non-empty and the MTU only when overridden, so the engine keeps its own
    /// defaults otherwise.
    pub fn configure_context<C: ContextSetup + ?Sized>(&self, ctx: &mut C) -> MuxResult<()> {
        ctx.set_engine_logging(self.engine_logging);
        ctx.set_protocol(self.protocol)
            .map_err(|e| MuxError::Config(format!("protocol {:?} rejected: {e}", self.protocol)))?;
        ctx.set_verify_mode(self.verify_mode);

        if let Some(cert) = &self.cert_file {
            ctx.load_certificate(cert, self.key_file.as_deref()).map_err(|e| {
                MuxError::Config(format!("certificate {} rejected: {e}", cert.display()))
            })?;
        }
        if let Some(ca_certs) = &self.ca_certs {
            ctx.load_ca_certs(ca_certs).map_err(|e| {
                MuxError::Config(format!("ca certificates {} rejected: {e}", ca_certs.display()))
            })?;
        }

        if !self.ciphers.is_empty() {
            ctx.set_ciphers(&self.ciphers)
                .map_err(|e| MuxError::Config(format!("cipher list rejected: {e}")))?;
        }
        if !self.curves.is_empty() {
            ctx.set_curves(&self.curves)
                .map_err(|e| MuxError::Config(format!("curve list rejected: {e}")))?;
        }
        if !self.sigalgs.is_empty() {
            ctx.set_sigalgs(&self.sigalgs)
                .map_err(|e| MuxError::Config(format!("sigalg list rejected: {e}")))?;
        }
        if self.role == Role::Server {
            ctx.set_ecdh_curve(self.server_key_exchange_curve.as_deref())
                .map_err(|e| MuxError::Config(format!("key exchange curve rejected: {e}")))?;
        }
        if self.cert_file.is_some() {
            ctx.build_cert_chain(self.cert_chain_options)
                .map_err(|e| MuxError::Config(format!("certificate chain rejected: {e}")))?;
        }
        if let Some(mtu) = self.mtu {
            ctx.set_link_mtu(mtu);
        }
        ctx.set_retransmit_timer(self.retransmit_timer());

        debug!(
            role = %self.role,
            protocol = ?self.protocol,
            verify = ?self.verify_mode,
            certificate = self.cert_file.is_some(),
            mtu = ?self.mtu,
            "context configured"
        );
        Ok(())
    }
}

impl fmt::Debug for DtlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsConfig")
            .field("role", &self.role)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("ca_certs", &self.ca_certs)
            .field("cert_chain_options", &self.cert_chain_options)
            .field("verify_mode", &self.verify_mode)
            .field("protocol", &self.protocol)
            .field("ciphers", &self.ciphers)
            .field("curves", &self.curves)
            .field("sigalgs", &self.sigalgs)
            .field("server_key_exchange_curve", &self.server_key_exchange_curve)
            .field("mtu", &self.mtu)
            .field("idle_timeout", &self.idle_timeout)
            .field("retransmit_interval", &self.retransmit_interval)
            .field("wait_timeout", &self.wait_timeout)
            .field("handshake_on_connect", &self.handshake_on_connect)
            .field("suppress_ragged_eofs", &self.suppress_ragged_eofs)
            .field("engine_logging", &self.engine_logging)
            .field("fault_policy", &self.fault_policy.is_some())
            .finish()
    }
}

/// Builder for [`DtlsConfig`].
#[derive(Debug)]
pub struct DtlsConfigBuilder {
    config: DtlsConfig,
}

impl DtlsConfigBuilder {
    /// Set the certificate chain file.
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cert_file = Some(path.into());
        self
    }

    /// Set the private key file.
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key_file = Some(path.into());
        self
    }

    /// Set the CA bundle used to verify the peer.
    pub fn ca_certs(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_certs = Some(path.into());
        self
    }

    /// Set the flags for building the certificate chain.
    ///
    /// Defaults to [`CertChainOptions::NONE`].
    pub fn cert_chain_options(mut self, options: CertChainOptions) -> Self {
        self.config.cert_chain_options = options;
        self
    }

    /// Set the peer verification mode.
    ///
    /// Defaults to [`VerifyMode::None`].
    pub fn verify_mode(mut self, mode: VerifyMode) -> Self {
        self.config.verify_mode = mode;
        self
    }

    /// Set the protocol version selector.
    ///
    /// Defaults to DTLS 1.2 for clients and any version for servers.
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Restrict cipher suites.
    pub fn ciphers<I, S>(mut self, ciphers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ciphers = ciphers.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict key-exchange curves.
    pub fn curves<I, S>(mut self, curves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.curves = curves.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict signature algorithms.
    pub fn sigalgs<I, S>(mut self, sigalgs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.sigalgs = sigalgs.into_iter().map(Into::into).collect();
        self
    }

    /// Select the server's ephemeral key-exchange curve. Server only.
    pub fn server_key_exchange_curve(mut self, curve: impl Into<String>) -> Self {
        self.config.server_key_exchange_curve = Some(curve.into());
        self
    }

    /// Override the link MTU.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.mtu = Some(mtu);
        self
    }

    /// Evict server sessions idle for longer than `timeout`. Server only.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Set the handshake retransmission interval.
    ///
    /// Defaults to 1 second.
    pub fn retransmit_interval(mut self, interval: Duration) -> Self {
        self.config.retransmit_interval = Some(interval);
        self
    }

    /// Bound the readiness wait (server) or socket operations (client).
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Run the client handshake when connecting.
    ///
    /// Defaults to true for clients, false for servers.
    pub fn handshake_on_connect(mut self, enabled: bool) -> Self {
        self.config.handshake_on_connect = enabled;
        self
    }

    /// Treat a peer vanishing without close notification as noise.
    ///
    /// Defaults to true.
    pub fn suppress_ragged_eofs(mut self, enabled: bool) -> Self {
        self.config.suppress_ragged_eofs = enabled;
        self
    }

    /// Enable the engine's protocol trace.
    ///
    /// Defaults to false.
    pub fn engine_logging(mut self, enabled: bool) -> Self {
        self.config.engine_logging = enabled;
        self
    }

    /// Install recovery hooks for fatal session faults. Server only.
    pub fn fault_policy(mut self, policy: impl FaultPolicy + 'static) -> Self {
        self.config.fault_policy = Some(Arc::new(policy));
        self
    }

    /// Install shared recovery hooks for fatal session faults. Server only.
    pub fn shared_fault_policy(mut self, policy: Arc<dyn FaultPolicy>) -> Self {
        self.config.fault_policy = Some(policy);
        self
    }

    /// Validate and build the configuration.
    ///
    /// Returns `MuxError::Config` for a zero MTU, a zero retransmit interval, a
    /// key file without a certificate, or a server-only option on a client
    /// configuration.
    pub fn build(self) -> MuxResult<DtlsConfig> {
        let config = self.config;

        if config.key_file.is_some() && config.cert_file.is_none() {
            return Err(MuxError::Config("key file given without a certificate".into()));
        }

        if config.mtu == Some(0) {
            return Err(MuxError::Config("mtu must be non-zero".into()));
        }
        if config.retransmit_interval == Some(Duration::ZERO) {
            return Err(MuxError::Config("retransmit interval must be non-zero".into()));
        }
        if config.role == Role::Client {
            if config.idle_timeout.is_some() {
                return Err(MuxError::Config("idle timeout is a server option".into()));
            }
            if config.server_key_exchange_curve.is_some() {
                return Err(MuxError::Config(
                    "key exchange curve is a server option".into(),
                ));
            }
            if config.fault_policy.is_some() {
                return Err(MuxError::Config("fault hooks are a server option".into()));
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultHooks;
    use crate::testing::MockContext;

    #[test]
    fn test_role_defaults() {
        let client = DtlsConfig::client().build().unwrap();
        assert_eq!(client.role(), Role::Client);
        assert_eq!(client.protocol(), ProtocolVersion::Dtls1_2);
        assert!(client.handshake_on_connect());

        let server = DtlsConfig::server().build().unwrap();
        assert_eq!(server.protocol(), ProtocolVersion::Any);
        assert!(!server.handshake_on_connect());
        assert!(server.idle_timeout().is_none());
        assert!(server.suppress_ragged_eofs());
    }

    #[test]
    fn test_builder_setters() {
        let config = DtlsConfig::server()
            .cert_file("server.pem")
            .key_file("server.key")
            .ca_certs("ca.pem")
            .verify_mode(VerifyMode::Required)
            .idle_timeout(Duration::from_secs(5))
            .wait_timeout(Duration::from_millis(200))
            .build()
            .unwrap();

        assert_eq!(config.cert_file(), Some(Path::new("server.pem")));
        assert_eq!(config.key_file(), Some(Path::new("server.key")));
        assert_eq!(config.ca_certs(), Some(Path::new("ca.pem")));
        assert_eq!(config.verify_mode(), VerifyMode::Required);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.wait_timeout(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_rejects_server_options_on_client() {
        let err = DtlsConfig::client()
            .idle_timeout(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, MuxError::Config(_)));

        let err = DtlsConfig::client()
            .fault_policy(FaultHooks::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, MuxError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(DtlsConfig::server().mtu(0).build().is_err());
        assert!(
            DtlsConfig::server()
                .retransmit_interval(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_configure_context_installs_overrides() {
        let config = DtlsConfig::server()
            .cert_file("server.pem")
            .key_file("server.key")
            .ca_certs("ca.pem")
            .cert_chain_options(CertChainOptions::NO_ROOT)
            .verify_mode(VerifyMode::Optional)
            .protocol(ProtocolVersion::Dtls1_2)
            .ciphers(["ECDHE-ECDSA-AES128-GCM-SHA256"])
            .curves(["prime256v1", "secp384r1"])
            .server_key_exchange_curve("prime256v1")
            .mtu(1200)
            .retransmit_interval(Duration::from_millis(500))
            .engine_logging(true)
            .build()
            .unwrap();

        let mut ctx = MockContext::default();
        config.configure_context(&mut ctx).unwrap();

        assert!(ctx.engine_logging);
        assert_eq!(ctx.protocol, Some(ProtocolVersion::Dtls1_2));
        assert_eq!(ctx.verify_mode, Some(VerifyMode::Optional));
        assert_eq!(
            ctx.certificate,
            Some((PathBuf::from("server.pem"), Some(PathBuf::from("server.key"))))
        );
        assert_eq!(ctx.ca_certs, Some(PathBuf::from("ca.pem")));
        assert_eq!(ctx.cert_chain, Some(CertChainOptions::NO_ROOT));
        assert_eq!(ctx.ciphers, Some(vec!["ECDHE-ECDSA-AES128-GCM-SHA256".to_string()]));
        assert_eq!(ctx.curves.as_ref().map(Vec::len), Some(2));
        assert_eq!(ctx.sigalgs, None);
        assert_eq!(ctx.ecdh_curve, Some(Some("prime256v1".to_string())));
        assert_eq!(ctx.link_mtu, Some(1200));
        assert_eq!(
            ctx.timer.map(|t| t.interval()),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_configure_context_keeps_engine_defaults() {
        let config = DtlsConfig::client().build().unwrap();
        let mut ctx = MockContext::default();
        config.configure_context(&mut ctx).unwrap();

        assert_eq!(ctx.ciphers, None);
        assert_eq!(ctx.link_mtu, None);
        assert_eq!(ctx.protocol, Some(ProtocolVersion::Dtls1_2));
        assert_eq!(ctx.verify_mode, Some(VerifyMode::None));
        // No certificate, so no chain to build.
        assert_eq!(ctx.certificate, None);
        assert_eq!(ctx.ca_certs, None);
        assert_eq!(ctx.cert_chain, None);
        // Client contexts never touch the server key-exchange curve.
        assert_eq!(ctx.ecdh_curve, None);
        assert_eq!(ctx.timer.map(|t| t.interval()), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_configure_context_surfaces_rejection() {
        let config = DtlsConfig::client().ciphers(["NOT-A-CIPHER"]).build().unwrap();
        let mut ctx = MockContext {
            reject_ciphers: true,
            ..MockContext::default()
        };

        let err = config.configure_context(&mut ctx).unwrap_err();
        assert!(matches!(err, MuxError::Config(msg) if msg.contains("cipher")));
    }

    #[test]
    fn test_certificate_without_separate_key() {
        let config = DtlsConfig::client().cert_file("client.pem").build().unwrap();
        let mut ctx = MockContext::default();
        config.configure_context(&mut ctx).unwrap();

        assert_eq!(ctx.certificate, Some((PathBuf::from("client.pem"), None)));
        assert_eq!(ctx.cert_chain, Some(CertChainOptions::NONE));
    }

    #[test]
    fn test_rejects_key_without_certificate() {
        let err = DtlsConfig::server().key_file("server.key").build().unwrap_err();
        assert!(matches!(err, MuxError::Config(msg) if msg.contains("key file")));
    }

    #[test]
    fn test_configure_context_surfaces_certificate_rejection() {
        let config = DtlsConfig::server()
            .cert_file("missing.pem")
            .ciphers(["ECDHE-ECDSA-AES128-GCM-SHA256"])
            .build()
            .unwrap();
        let mut ctx = MockContext {
            reject_certificate: true,
            ..MockContext::default()
        };

        let err = config.configure_context(&mut ctx).unwrap_err();
        assert!(matches!(err, MuxError::Config(msg) if msg.contains("missing.pem")));
        // Nothing after the certificate was installed.
        assert_eq!(ctx.ciphers, None);
        assert_eq!(ctx.cert_chain, None);
        assert!(ctx.timer.is_none());
    }
}
