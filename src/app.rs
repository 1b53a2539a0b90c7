use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::Client;
use teloxide::prelude::*;
use tokio::{task::JoinHandle, time::timeout};
use tokio_cron_scheduler::JobScheduler;

use crate::{
    commands::CommandService,
    config::AppConfig,
    extract::FeedExtractor,
    infrastructure::{directories::ResolvedPaths, notifier::notify_admin_group, shutdown::Shutdown},
    scan::ScanEngine,
    source::{FeedPoller, LiveFeed, RedditClient, SharedFeed},
    store::{KvStore, RuleStore, SqliteKvStore, StatsStore},
    tasks::{scheduler::configure_poll_jobs, stats::StatsAggregator},
    telegram::TelegramService,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FeedFilterApp {
    scheduler: JobScheduler,
    engine_handles: Vec<JoinHandle<()>>,
    stats_handle: JoinHandle<()>,
    stats_shutdown: Shutdown,
    telegram: TelegramService,
    store: Arc<SqliteKvStore>,
    shutdown: Shutdown,
    config: Arc<AppConfig>,
    bot: Bot,
}

impl FeedFilterApp {
    pub async fn initialize(config: AppConfig, paths: ResolvedPaths, shutdown: Shutdown) -> Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(
            SqliteKvStore::open(&paths.db_path)
                .await
                .with_context(|| format!("failed to open store at {}", paths.db_path.display()))?,
        );
        let kv: Arc<dyn KvStore> = store.clone();
        let rule_store = RuleStore::new(kv.clone());

        // Stats stop after the engines so their last outcomes are written.
        let (stats_shutdown, stats_listener) = Shutdown::new();
        let (stats, stats_handle) = StatsAggregator::start(
            StatsStore::new(kv),
            config.filter.stats_write_mode,
            stats_listener,
        );

        let http_client = Client::builder()
            .user_agent(format!("shutup-feed-rust/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let reddit = RedditClient::new(http_client, &config.source);

        let mut feeds: Vec<SharedFeed> = Vec::with_capacity(config.source.views.len());
        let mut engine_handles = Vec::with_capacity(config.source.views.len());
        for target in &config.source.views {
            let feed = LiveFeed::new(target.clone(), config.source.retain);
            let engine = ScanEngine::new(
                target.to_string(),
                feed.profile().clone(),
                feed.collection().clone(),
                FeedExtractor::default(),
                stats.clone(),
            );
            engine_handles.push(engine.spawn(
                feed.collection().subscribe(),
                rule_store.clone(),
                shutdown.subscribe(),
            ));
            feeds.push(Arc::new(Mutex::new(feed)));
            tracing::info!(target: "app", view = %target, "feed view registered");
        }
        let poller = Arc::new(FeedPoller::new(reddit, feeds));

        let commands = CommandService::new(rule_store, stats, config.filter.default_pause);
        let bot = Bot::new(&config.telegram_bot_token);
        let telegram = TelegramService::new(bot.clone(), config.clone(), commands, poller.clone());

        let scheduler = configure_poll_jobs(&config.scheduler.poll_crons, poller.clone()).await?;
        tokio::spawn(async move {
            let refreshed = poller.poll_all().await;
            tracing::info!(target: "app", refreshed, "initial feed refresh finished");
        });

        Ok(Self {
            scheduler,
            engine_handles,
            stats_handle,
            stats_shutdown,
            telegram,
            store,
            shutdown,
            config,
            bot,
        })
    }

    pub async fn run(self) -> Result<()> {
        let FeedFilterApp {
            mut scheduler,
            engine_handles,
            mut stats_handle,
            stats_shutdown,
            telegram,
            store,
            shutdown,
            config,
            bot,
        } = self;

        tracing::info!(target: "app", "피드 필터 봇 시작");
        notify_admin_group(&bot, config.admin_group_id, "피드 필터 봇이 시작되었습니다.").await;

        let mut shutdown_listener = shutdown.subscribe();
        let mut telegram_future = Box::pin(telegram.run(shutdown.subscribe()));
        let mut telegram_completed = false;

        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!(target: "app", "종료 신호 감지 (CTRL+C / SIGTERM)");
            }
            res = &mut telegram_future => {
                telegram_completed = true;
                if let Err(err) = res {
                    tracing::error!(target: "telegram", ?err, "Telegram dispatcher 종료 중 오류");
                } else {
                    tracing::info!(target: "telegram", "Telegram dispatcher 정상 종료");
                }
            }
        }

        shutdown.trigger();

        if !telegram_completed && timeout(SHUTDOWN_TIMEOUT, &mut telegram_future).await.is_err() {
            tracing::warn!(
                target: "telegram",
                "Telegram dispatcher did not stop within {:?}; forcing exit",
                SHUTDOWN_TIMEOUT
            );
        }

        match timeout(SHUTDOWN_TIMEOUT, scheduler.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(target: "scheduler", ?err, "스케줄러 종료 실패"),
            Err(_) => tracing::warn!(
                target: "scheduler",
                "스케줄러 종료가 {:?} 내에 완료되지 않았습니다.",
                SHUTDOWN_TIMEOUT
            ),
        }

        let aborts: Vec<_> = engine_handles.iter().map(JoinHandle::abort_handle).collect();
        match timeout(SHUTDOWN_TIMEOUT, join_all(engine_handles)).await {
            Ok(results) => {
                if results.iter().any(|res| res.as_ref().is_err_and(|err| err.is_panic())) {
                    tracing::error!(target: "scan", "필터 엔진 작업이 패닉으로 종료되었습니다");
                }
            }
            Err(_) => {
                tracing::warn!(target: "scan", "필터 엔진 종료가 {:?} 내에 완료되지 않아 작업을 중단합니다", SHUTDOWN_TIMEOUT);
                aborts.iter().for_each(|handle| handle.abort());
            }
        }

        stats_shutdown.trigger();
        if timeout(SHUTDOWN_TIMEOUT, &mut stats_handle).await.is_err() {
            tracing::warn!(target: "stats", "통계 기록기 종료가 {:?} 내에 완료되지 않았습니다.", SHUTDOWN_TIMEOUT);
            stats_handle.abort();
        }

        if timeout(SHUTDOWN_TIMEOUT, store.close()).await.is_err() {
            tracing::warn!(target: "store", "저장소 정리가 {:?} 내에 완료되지 않았습니다.", SHUTDOWN_TIMEOUT);
        }

        tracing::info!(target: "app", "봇 종료 완료");
        notify_admin_group(&bot, config.admin_group_id, "피드 필터 봇이 종료되었습니다.").await;
        Ok(())
    }
}
