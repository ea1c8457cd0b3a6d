/*!
Train a stacked recurrent model on a price table and forecast its target
*/
use anyhow::format_err;
use chrono::NaiveDate;
use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
use io_enum::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{read_to_string, File};
use std::io::{stdin, stdout, Stdin};
use std::path::Path;
use stockcast::data::{fake::ohlcv_walk, indicators::*, io::read_table};
use stockcast::model::torch::TchModelFactory;
use stockcast::*;
use tch::Device;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Read)]
pub enum IoSources {
    Stdin(Stdin),
    File(File),
}

fn load_config(path: Option<&str>, matches: &clap::ArgMatches) -> anyhow::Result<ModelConfig> {
    if let Some(path) = path {
        let json = read_to_string(Path::new(path))?;
        let config = if json.contains("layer_widgets_dict") {
            ModelConfig::from_widget_json(&json)?
        } else {
            ModelConfig::from_json(&json)?
        };
        return Ok(config);
    }
    let layers: usize = matches.value_of("layers").unwrap_or("2").parse()?;
    let target = matches.value_of("target").unwrap_or("close");
    let mut config = ModelConfig::new(LayerConfigBuilder::new(layers).build()?, target);
    if let Some(cols) = matches.values_of("columns") {
        let cols: Vec<&str> = cols.collect();
        config = config.with_training_cols(&cols[..]);
    }
    if let Some(epochs) = matches.value_of("epochs") {
        config.epochs = epochs.parse()?;
    }
    if let Some(period) = matches.value_of("period") {
        config.forecast_period = period.parse()?;
    }
    if let Some(years) = matches.value_of("backtest") {
        config.backtest_years = years.parse()?;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("Stock Forecaster")
        .version("1.0")
        .about(
            "Trains a stacked recurrent network on a CSV price table (or a random walk) \
             and forecasts its target",
        )
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input CSV file to use. Reads standard input if absent")
                .index(1),
        )
        .arg(
            Arg::with_name("synthetic")
                .long("synthetic")
                .help("Forecasts this many days of a random walk instead of reading input")
                .takes_value(true)
                .conflicts_with("INPUT"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("A JSON model configuration, either plain or in widget form")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("target")
                .short("t")
                .long("target")
                .help("The column to forecast")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("columns")
                .long("columns")
                .help("Additional training columns")
                .takes_value(true)
                .multiple(true),
        )
        .arg(
            Arg::with_name("rsi")
                .long("rsi")
                .help("Adds a relative strength index of the target as a training column"),
        )
        .arg(Arg::with_name("layers").long("layers").takes_value(true))
        .arg(Arg::with_name("epochs").long("epochs").takes_value(true))
        .arg(Arg::with_name("period").long("period").takes_value(true))
        .arg(Arg::with_name("backtest").long("backtest").takes_value(true))
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .help("Seeds data generation and model initialization")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("device")
                .short("d")
                .long("device")
                .help("Sets the device to run on: cuda or cpu")
                .takes_value(true),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let device: Device = match matches.value_of("device").unwrap_or("cuda") {
        "cuda" => Device::cuda_if_available(),
        "cpu" => Device::Cpu,
        device => return Err(format_err!("Invalid value for device: {:?}", device)),
    };
    let seed: Option<u64> = matches.value_of("seed").map(|s| s.parse::<u64>()).transpose()?;

    let mut series = if let Some(days) = matches.value_of("synthetic") {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let start = NaiveDate::from_ymd_opt(2015, 1, 1)
            .ok_or_else(|| format_err!("bad start date"))?;
        ohlcv_walk(rng, start, days.parse()?, 40.0)?
    } else {
        let reader = if let Some(path) = matches.value_of("INPUT") {
            IoSources::File(File::open(Path::new(path))?)
        } else {
            IoSources::Stdin(stdin())
        };
        read_table(reader)?
    };

    let mut config = load_config(matches.value_of("config"), &matches)?;
    if matches.is_present("rsi") {
        let target = config.target_variable.clone();
        add_rsi(&mut series, &target, RSI_PERIOD)?;
        let mut cols = config.training_cols.clone();
        cols.push("rsi".into());
        config = config.with_training_cols(&cols[..]);
    }

    let mut factory = TchModelFactory::new(device);
    if let Some(seed) = seed {
        factory = factory.with_seed(seed);
    }
    let engine = ForecastEngine::new(factory);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {elapsed} {msg}"));
    spinner.set_message(&format!(
        "Forecasting {} over {} rows on {:?}",
        config.target_variable,
        series.len(),
        device
    ));
    spinner.enable_steady_tick(100);

    let (worker, outcome) = ForecastWorker::spawn_channel(engine, series, config)?;
    let forecast = outcome.recv()?;
    worker.join()?;
    spinner.finish_and_clear();

    let forecast = forecast?;
    forecast.write_csv(stdout())?;
    Ok(())
}
