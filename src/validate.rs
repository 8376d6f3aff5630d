use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use argh::FromArgs;
use discovery::Discoverer;
use exitcode::ExitCode;
use framework::Context;
use stackit_sd::config::{self, Config};

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "validate",
    description = "Validate the config file, then exit",
    help_triggers("-h", "--help")
)]
pub struct Validate {
    #[argh(
        switch,
        short = 'd',
        description = "fail validation on warnings that are probably a mistake in the configuration"
    )]
    deny_warnings: bool,

    #[argh(
        switch,
        description = "disable environment checks, the STACKIT API is not called"
    )]
    no_environment: bool,

    #[argh(option, short = 'c', description = "read configuration from file")]
    config: PathBuf,
}

impl Validate {
    pub fn run(&self) -> ExitCode {
        let color = std::io::stdout().is_terminal();

        let mut fmt = Formatter::new(color);
        let config = match self.validate_config(&mut fmt) {
            Some(config) => config,
            None => return exitcode::CONFIG,
        };

        let discoverer = match config.stackit.build() {
            Ok(discoverer) => {
                fmt.success("Discovery configuration");
                discoverer
            }
            Err(err) => {
                fmt.title("Discovery errors");
                fmt.sub_error([err]);
                return exitcode::CONFIG;
            }
        };

        if self.no_environment {
            fmt.validated();
            return exitcode::OK;
        }

        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(_) => return exitcode::CANTCREAT,
        };

        let validated = rt.block_on(async move {
            match discoverer.refresh(&Context::background()).await {
                Ok(groups) => {
                    let targets = groups
                        .iter()
                        .map(|group| group.targets.len())
                        .sum::<usize>();
                    if targets == 0 {
                        fmt.warning("No ready MongoDB Flex instance found");
                        return (!self.deny_warnings, fmt);
                    }

                    fmt.success(format!("Discovered {targets} targets"));
                    (true, fmt)
                }
                Err(err) => {
                    fmt.error(format!("Discover targets failed, {err}"));
                    (false, fmt)
                }
            }
        });

        match validated {
            (true, fmt) => {
                fmt.validated();
                exitcode::OK
            }
            (false, _) => exitcode::UNAVAILABLE,
        }
    }

    fn validate_config(&self, fmt: &mut Formatter) -> Option<Config> {
        match config::load(&self.config) {
            Ok(config) => {
                fmt.success(format!("Loaded {:?}", self.config));
                Some(config)
            }
            Err(errs) => {
                fmt.title(format!("Failed to load {:?}", self.config));
                fmt.sub_error(errs);
                None
            }
        }
    }
}

struct Formatter {
    /// Width of largest printed line
    max_line_width: usize,
    /// Can empty line be printed
    print_space: bool,
    color: bool,
    // Intros
    error_intro: &'static str,
    warning_intro: &'static str,
    success_intro: &'static str,
}

impl Formatter {
    fn new(color: bool) -> Self {
        Self {
            max_line_width: 0,
            print_space: false,
            error_intro: if color {
                // red
                "\x1b[31mx\x1b[0m"
            } else {
                "x"
            },
            warning_intro: if color {
                // yellow
                "\x1b[33m~\x1b[0m"
            } else {
                "~"
            },
            success_intro: if color {
                // green
                "\x1b[32m√\x1b[0m"
            } else {
                "√"
            },
            color,
        }
    }

    /// Final confirmation that validation process was successful.
    #[allow(clippy::print_stdout)]
    fn validated(&self) {
        println!("{:-^width$}", "", width = self.max_line_width);

        if self.color {
            // the escape codes must not count into the width
            println!(
                "{:>width$}",
                "\x1b[32mValidated\x1b[0m", // green
                width = self.max_line_width
            );
        } else {
            println!("{:>width$}", "Validated", width = self.max_line_width)
        }
    }

    /// Standalone line
    fn success(&mut self, msg: impl AsRef<str>) {
        self.print(format!("{} {}\n", self.success_intro, msg.as_ref()))
    }

    /// Standalone line
    fn warning(&mut self, warning: impl AsRef<str>) {
        self.print(format!("{} {}\n", self.warning_intro, warning.as_ref()))
    }

    /// Standalone line
    fn error(&mut self, error: impl AsRef<str>) {
        self.print(format!("{} {}\n", self.error_intro, error.as_ref()))
    }

    /// Marks sub
    fn title(&mut self, title: impl AsRef<str>) {
        self.space();
        self.print(format!(
            "{}\n{:-<width$}\n",
            title.as_ref(),
            "",
            width = title.as_ref().len()
        ))
    }

    /// A list of errors that go with a title.
    fn sub_error<I: IntoIterator>(&mut self, errors: I)
    where
        I::Item: fmt::Display,
    {
        for msg in errors {
            self.print(format!("{} {}\n", self.error_intro, msg));
        }
        self.space();
    }

    /// Prints empty space if necessary.
    fn space(&mut self) {
        if self.print_space {
            self.print_space = false;
            #[allow(clippy::print_stdout)]
            {
                println!();
            }
        }
    }

    fn print(&mut self, print: impl AsRef<str>) {
        let width = print
            .as_ref()
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        self.max_line_width = width.max(self.max_line_width);
        self.print_space = true;
        #[allow(clippy::print_stdout)]
        {
            print!("{}", print.as_ref())
        }
    }
}
