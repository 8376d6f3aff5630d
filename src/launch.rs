use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use discovery::Discoverer;
use discovery::stackit::SOURCE;
use exitcode::ExitCode;
use framework::{Context, observe, signal};
use stackit_sd::{config, file_sd};
use tracing::{error, info, warn};

use crate::validate;

const WORKER_THREADS_ENV: &str = "STACKIT_SD_WORKER_THREADS";

// discovery is mostly idle, two threads are plenty
const DEFAULT_WORKER_THREADS: usize = 2;

fn default_worker_threads() -> usize {
    let Ok(value) = std::env::var(WORKER_THREADS_ENV) else {
        return DEFAULT_WORKER_THREADS;
    };

    match value.parse::<usize>() {
        Ok(threads) if threads > 0 => threads,
        _ => {
            warn!(
                message = "invalid worker threads, fallback to default",
                env = WORKER_THREADS_ENV,
                %value,
                default = DEFAULT_WORKER_THREADS,
            );
            DEFAULT_WORKER_THREADS
        }
    }
}

#[derive(FromArgs)]
#[argh(
    description = "Discovers STACKIT MongoDB Flex instances and writes them as Prometheus file_sd targets",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level"
    )]
    log_level: String,

    #[argh(
        option,
        short = 'c',
        long = "config",
        description = "read configuration from file"
    )]
    config: Option<PathBuf>,

    #[argh(switch, description = "run one refresh, write the targets and exit")]
    once: bool,

    #[argh(
        option,
        short = 't',
        description = "specify how many threads the Tokio runtime will use, defaults to $STACKIT_SD_WORKER_THREADS or 2"
    )]
    threads: Option<usize>,

    #[argh(subcommand)]
    sub_commands: Option<SubCommands>,
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!("stackit-sd {}", framework::get_version());
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        if let Some(sub_command) = &self.sub_commands {
            return sub_command.run();
        }

        let log_level = std::env::var("STACKIT_SD_LOG").unwrap_or(self.log_level.clone());
        let color = std::io::stderr().is_terminal();
        framework::trace::init(color, &log_level);

        let Some(path) = &self.config else {
            error!(message = "config file is required, use -c to specify one");
            return Err(exitcode::USAGE);
        };
        let config = config::load(path).map_err(handle_config_errors)?;

        let threads = match self.threads {
            Some(threads) => threads.max(1),
            None => default_worker_threads(),
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("stackit-sd-worker")
            .worker_threads(threads)
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build tokio runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(async move {
            let discoverer = config.stackit.build().map_err(|err| {
                error!(message = "build discovery failed", %err);
                exitcode::CONFIG
            })?;

            info!(
                message = "Start stackit-sd",
                version = framework::get_version(),
                role = config.stackit.role.as_str(),
                project = config.stackit.project,
                region = config.stackit.region,
                output = ?config.output,
            );

            let (cx, handle) = Context::background().with_cancel();
            tokio::spawn(async move {
                if let Err(err) = signal::cancel_on_signal(handle).await {
                    error!(message = "listen for signals failed", %err);
                }
            });

            if self.once {
                let groups = discoverer.refresh(&cx).await.map_err(|err| {
                    error!(message = "refresh target groups failed", %err);
                    exitcode::UNAVAILABLE
                })?;

                return file_sd::write(config.output.as_deref(), &groups).map_err(|err| {
                    error!(message = "write targets failed", %err);
                    exitcode::IOERR
                });
            }

            let observer = observe::register(SOURCE);
            let notifier = observe::subscribe(SOURCE).ok_or(exitcode::SOFTWARE)?;

            let discovery = observe::run(
                observer,
                config.stackit.refresh_interval,
                cx.clone(),
                async |cx: Context| -> framework::Result<Vec<observe::TargetGroup>> {
                    let groups = discoverer.refresh(&cx).await?;
                    Ok(groups)
                },
            );
            let writer = file_sd::run(notifier, config.output.clone(), cx);

            tokio::join!(discovery, writer);

            info!(message = "stackit-sd stopped");

            Ok::<(), ExitCode>(())
        })?;

        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}

pub fn handle_config_errors(errors: Vec<String>) -> ExitCode {
    for err in errors {
        error!(message = "configuration error", %err);
    }

    exitcode::CONFIG
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum SubCommands {
    Validate(validate::Validate),
}

impl SubCommands {
    fn run(&self) -> Result<(), ExitCode> {
        match self {
            SubCommands::Validate(validate) => match validate.run() {
                exitcode::OK => Ok(()),
                other => Err(other),
            },
        }
    }
}
