/*!
Load a price table and standardize its columns
*/
use clap::{App, Arg};
use io_enum::*;
use std::fs::File;
use std::io::{stdin, Stdin};
use std::path::Path;
use stockcast::data::{io::read_table, scale::StandardScaler};

#[derive(Debug, Read)]
pub enum IoSources {
    Stdin(Stdin),
    File(File),
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("Stock Data Scaler")
        .version("1.0")
        .about("Loads a price table from a file (or standard input) and standardizes each column")
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input file to use")
                .index(1),
        )
        .get_matches();
    let reader = if let Some(path) = matches.value_of("INPUT") {
        IoSources::File(File::open(Path::new(path))?)
    } else {
        IoSources::Stdin(stdin())
    };
    let table = read_table(reader)?;
    println!(
        "Read {} rows from {} to {}",
        table.len(),
        table.dates()[0],
        table.last_date()
    );
    let data = table.select(table.column_names())?;
    let scaler = StandardScaler::fit(&data)?;
    let scaled = scaler.transform(&data)?;
    for (col, name) in table.column_names().iter().enumerate() {
        let (min, max) = scaled
            .column(col)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
        println!(
            "{:>10}: mean = {:>12.4}, scale = {:>12.4}, scaled range = [{:.3}, {:.3}]",
            name, scaler.means[col], scaler.scales[col], min, max
        );
    }
    Ok(())
}
