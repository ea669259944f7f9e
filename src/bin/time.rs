use clap::Parser;

use perfbench::{bench, Resolution};

/// Print the wall time of one program run
#[derive(Parser)]
#[command(name = "perfbench-time")]
struct Cli {
    /// Unit of the reported time (s, ds, ms, us, ns)
    #[arg(short, long, default_value = "us")]
    resolution: Resolution,

    /// Program to run
    program: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let args: Vec<&str> = cli.args.iter().map(String::as_str).collect();
    match bench::bench_bin(cli.resolution, &cli.program, &args) {
        Ok(t) => println!("{}", t),
        Err(e) => {
            eprintln!("perfbench-time: {}", e);
            std::process::exit(1);
        }
    }
}
