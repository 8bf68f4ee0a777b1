use clap::{App, Arg, ArgMatches, SubCommand};
use log::error;
use rust_ycsb_bench::config::DbConfig;
use rust_ycsb_bench::registry::Registry;
use rust_ycsb_bench::workload::{
    generate_load, generate_report, generate_run, run_workload, summarize, Workload,
    WorkloadReport, WorkloadResult, WorkloadSpec,
};
use std::io::{stdin, stdout};
use std::process;

fn main() {
    env_logger::init();

    let registry = Registry::builtin();
    let matches = App::new("Rust YCSB Benchmark")
        .version("0.1.0")
        .subcommand(
            SubCommand::with_name("generate_workload")
                .about("Generates a load or run phase workload")
                .arg(Arg::with_name("workload_spec").required(true))
                .arg(
                    Arg::with_name("phase")
                        .required(true)
                        .possible_values(&["load", "run"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a workload on a backend")
                .arg(
                    Arg::with_name("db_type")
                        .required(true)
                        .possible_values(&registry.names()),
                )
                .arg(
                    Arg::with_name("config")
                        .long("config")
                        .takes_value(true)
                        .help("JSON file with backend settings"),
                ),
        )
        .subcommand(SubCommand::with_name("report").about("Generate report"))
        .subcommand(
            SubCommand::with_name("summarize")
                .about("Median throughput per workload over a stream of reports"),
        )
        .get_matches();

    match matches.subcommand() {
        ("generate_workload", Some(matches)) => execute_generate_workload(&matches),
        ("run", Some(matches)) => execute_run(&registry, &matches),
        ("report", _) => execute_report(),
        ("summarize", _) => execute_summarize(),
        _ => {}
    }
}

fn execute_generate_workload(matches: &ArgMatches) {
    let spec: WorkloadSpec =
        serde_json::from_str(matches.value_of("workload_spec").unwrap()).expect("invalid json");
    if let Err(e) = spec.validate() {
        error!("{}", e);
        process::exit(2);
    }
    let workload = match matches.value_of("phase") {
        Some("load") => generate_load(&spec),
        _ => generate_run(&spec),
    };
    serde_json::to_writer(stdout(), &workload).expect("failed to write workload");
}

fn execute_run(registry: &Registry, matches: &ArgMatches) {
    let db_type = matches.value_of("db_type").unwrap();
    let config = match matches.value_of("config") {
        Some(path) => DbConfig::load(path).unwrap_or_else(|e| {
            error!("{}", e);
            process::exit(2)
        }),
        None => DbConfig::default(),
    };
    let mut db = registry
        .create(db_type, &config)
        .expect("backend listed in possible values");
    if let Err(e) = db.init() {
        error!("failed to initialize {}: {}", db_type, e);
        process::exit(1);
    }

    let workload: Workload = serde_json::from_reader(stdin()).expect("failed to read workload");
    let result = run_workload(&workload, db.as_mut());
    if let Err(e) = db.cleanup() {
        error!("failed to clean up {}: {}", db_type, e);
    }
    serde_json::to_writer(stdout(), &result).expect("failed to write workload result");
}

fn execute_report() {
    let result: WorkloadResult =
        serde_json::from_reader(stdin()).expect("failed to read workload result");
    let report = generate_report(&result);
    serde_json::to_writer_pretty(stdout(), &report).expect("failed to write report");
}

fn execute_summarize() {
    let reports = serde_json::Deserializer::from_reader(stdin())
        .into_iter::<WorkloadReport>()
        .collect::<Result<Vec<_>, _>>()
        .expect("failed to read reports");
    let summary = summarize(&reports);
    serde_json::to_writer_pretty(stdout(), &summary).expect("failed to write summary");
}
