//! Runtime bootstrap file (`server.js`) generation
//!
//! The generated script sets the Meteor environment, starts the bundled
//! server and, when a TLS proxy is configured, tries to start an HTTPS
//! reverse proxy in front of it. Proxy setup failures (missing certificate
//! files, missing `http-proxy` module) are caught inside the script and
//! leave the application running over plain HTTP.

use std::fmt::Write;
use std::path::PathBuf;

/// File name of the generated bootstrap script
pub const BOOTSTRAP_FILE_NAME: &str = "server.js";

/// Entrypoint of an unpacked Meteor bundle, relative to the release
pub const BUNDLE_ENTRYPOINT: &str = "./bundle/main.js";

/// Build the Meteor `ROOT_URL` for a domain
pub fn root_url(domain: &str, ssl_support: bool) -> String {
    let scheme = if ssl_support { "https" } else { "http" };
    format!("{scheme}://{domain}")
}

/// HTTPS reverse proxy started by the bootstrap script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsProxy {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub listen_port: u16,
    pub target: String,
}

impl TlsProxy {
    /// Proxy listening on `listen_port` and forwarding to the local app port
    pub fn new(
        key_path: impl Into<PathBuf>,
        cert_path: impl Into<PathBuf>,
        listen_port: u16,
        app_port: u16,
    ) -> Self {
        Self {
            key_path: key_path.into(),
            cert_path: cert_path.into(),
            listen_port,
            target: format!("http://localhost:{app_port}"),
        }
    }
}

/// Typed builder for the bootstrap script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBootstrap {
    root_url: String,
    database_url: String,
    port: u16,
    entrypoint: String,
    proxy: Option<TlsProxy>,
}

impl RuntimeBootstrap {
    pub fn new(root_url: impl Into<String>, database_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            database_url: database_url.into(),
            port: 80,
            entrypoint: BUNDLE_ENTRYPOINT.to_string(),
            proxy: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_proxy(mut self, proxy: TlsProxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Render the script
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("// Meteor\n\n");
        // Writing into a String cannot fail.
        let _ = writeln!(out, "process.env.ROOT_URL = {};", js_string(&self.root_url));
        let _ = writeln!(out, "process.env.MONGO_URL = {};", js_string(&self.database_url));
        let _ = writeln!(out, "process.env.PORT = {};", self.port);
        let _ = writeln!(out, "require({});", js_string(&self.entrypoint));

        if let Some(proxy) = &self.proxy {
            out.push_str("\n// Proxy (for HTTPS)\n\n");
            out.push_str("try {\n\n");
            out.push_str("  var fs = require('fs'),\n");
            out.push_str("      httpProxy = require('http-proxy');\n\n");
            out.push_str("  httpProxy.createProxyServer({\n");
            out.push_str("    ssl: {\n");
            let _ = writeln!(
                out,
                "      key: fs.readFileSync({}, 'utf8'),",
                js_string(&proxy.key_path.to_string_lossy())
            );
            let _ = writeln!(
                out,
                "      cert: fs.readFileSync({}, 'utf8')",
                js_string(&proxy.cert_path.to_string_lossy())
            );
            out.push_str("    },\n");
            let _ = writeln!(out, "    target: {},", js_string(&proxy.target));
            out.push_str("    ws: true,\n");
            out.push_str("    xfwd: true\n");
            let _ = writeln!(out, "  }}).listen({});", proxy.listen_port);
            out.push_str("\n} catch(err) {}\n");
        }

        out
    }
}

/// Encode a value as a JavaScript string literal.
///
/// JSON string syntax is valid JavaScript; the line and paragraph
/// separators are escaped as well for pre-ES2019 runtimes.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
