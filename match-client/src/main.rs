use anyhow::{Context, Result};
use match_client::{ChessEngine, ClientConfig, MatchEvent, MatchSession};
use protocol::WsConnector;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let mut config = ClientConfig::load();
    config.apply_overrides(|key| std::env::var(key).ok(), std::env::args().skip(1));

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("match_client={}", config.log_level.as_directive()).parse()?),
        )
        .init();

    config.validate()?;
    info!("对局客户端启动: {}", config.socket_url);

    let mut session = MatchSession::new(
        WsConnector,
        config.socket_url.clone(),
        ChessEngine::new(),
        config.match_options(),
        config.session_timing(),
    );
    let handle = session.handle();

    let on_exit = handle.clone();
    session.subscribe(move |event| match event {
        MatchEvent::StateChanged { from, to } => info!("{} -> {}", from, to),
        MatchEvent::MoveApplied { index, mv, local, .. } => {
            info!("#{} {}{}", index + 1, mv, if *local { " (local)" } else { "" })
        }
        MatchEvent::LowTimeAlert { remaining_ms } => {
            tracing::warn!("Low time: {:.1}s left", *remaining_ms as f64 / 1000.0)
        }
        MatchEvent::LatencyUpdated { latency, quality } => {
            tracing::debug!("Latency {:?} ({})", latency, quality)
        }
        MatchEvent::DrawOffered { by } => info!("{} offers a draw", by.name()),
        MatchEvent::Desync(e) => tracing::warn!("{}", e),
        MatchEvent::Error(message) => tracing::error!("{}", message),
        MatchEvent::Exited { message } => {
            info!("{}", message);
            on_exit.leave();
        }
        MatchEvent::ClockTick(_) | MatchEvent::PastPositionShown { .. } => {}
    });

    let on_ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, leaving match");
            on_ctrl_c.leave();
        }
    });

    session.run().await.context("对局异常结束")?;
    info!("对局客户端退出");
    Ok(())
}
