use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// the #[traced_test] decorator does not work well with integration
/// tests because each test module runs in its own crate, and the
/// decorator macro filters out events from wallet_lock.
///
/// Instead call this at the start of each test. There can be only one
/// global default subscriber, so the two cannot be combined.
pub fn tracing_logger() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("self=trace,wallet_lock=trace,tarpc=warn"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(env_filter)
        .with_thread_ids(true)
        .finish();

    // fails if another test in this process got there first. ignore.
    let _result = tracing::subscriber::set_global_default(subscriber);
}
