const USAGE: &str = "\
Signpost — temporary signed access to S3 objects

USAGE:
    signpost [OPTIONS]

OPTIONS:
    -h, --help           Print this help message and exit
    -v, --version        Print version and exit

REQUIRED ENVIRONMENT VARIABLES:
    SIGNPOST_S3_ENDPOINT              S3-compatible endpoint URL
    SIGNPOST_S3_REGION                Signing region
    SIGNPOST_S3_ACCESS_KEY_ID         Backend access key id
    SIGNPOST_S3_SECRET_ACCESS_KEY     Backend secret access key
    SIGNPOST_BASIC_AUTH_USERNAME      Gateway basic-auth username
    SIGNPOST_BASIC_AUTH_PASSWORD      Gateway basic-auth password

OPTIONAL (default shown):
    SIGNPOST_LISTEN                   Access API listen address    [:8080]
    SIGNPOST_METRICS_LISTEN           Prometheus metrics address   [:9100]
    SIGNPOST_URL_TTL_MINUTES          Signed URL validity          [15]
    SIGNPOST_MAX_BATCH_OBJECTS        Batch size ceiling           [25]
    SIGNPOST_PROBE_TIMEOUT_SECONDS    Backend probe timeout        [10]
    SIGNPOST_LOG_LEVEL                Log level                    [info]
";

pub fn print_usage() {
    print!("{USAGE}");
}

pub fn print_version(version: &str) {
    println!("signpost {version}");
}

fn handle_cli_flags_from_args(args: &[String], version: &str) -> bool {
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return true;
            }
            "-v" | "--version" => {
                print_version(version);
                return true;
            }
            _ => {}
        }
    }
    false
}

/// Check CLI args for --help/-h or --version/-v.
/// Returns `true` if a flag was handled (caller should exit).
pub fn handle_cli_flags(version: &str) -> bool {
    let args: Vec<String> = std::env::args().skip(1).collect();
    handle_cli_flags_from_args(&args, version)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::handle_cli_flags_from_args;

    #[test]
    fn handle_cli_flags_recognizes_help() {
        let args = vec!["--help".to_string()];
        assert!(handle_cli_flags_from_args(&args, "0.1.0"));
    }

    #[test]
    fn handle_cli_flags_recognizes_version() {
        let args = vec!["-v".to_string()];
        assert!(handle_cli_flags_from_args(&args, "0.1.0"));
    }

    #[test]
    fn handle_cli_flags_ignores_unrelated_args() {
        let args = vec!["--verbose".to_string()];
        assert!(!handle_cli_flags_from_args(&args, "0.1.0"));
    }

    #[test]
    fn handle_cli_flags_executes_runtime_wrapper() {
        let _ = super::handle_cli_flags("0.1.0");
    }
}
