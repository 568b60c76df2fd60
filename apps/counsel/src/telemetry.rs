use once_cell::sync::OnceCell;
use tracing::Level;

static INIT: OnceCell<()> = OnceCell::new();

/// Install the fmt subscriber for embedders that have not set one up.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
