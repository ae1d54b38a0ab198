extern crate cmb_sky_sim;

use std::fs::File;

use anyhow::{
    Context
    , Result
};

use clap::{
    App
    ,Arg
};

use cmb_sky_sim::{
    config::{
        InstrumentCfg
    }
    , partition::{
        RemainderPolicy
        , SeedPlan
        , SeedScheme
        , WorkPartitioner
        , WorkUnit
    }
};

fn main() -> Result<()> {
    let matches = App::new("show_partition")
        .arg(
            Arg::new("inst_file")
                .short('i')
                .long("inst_file")
                .takes_value(true)
                .value_name("yaml")
                .required(true)
                .help("instrument channels"),
        )
        .arg(
            Arg::new("nworkers")
                .short('p')
                .long("nworkers")
                .takes_value(true)
                .default_value("1")
                .help("number of workers"),
        )
        .arg(
            Arg::new("nmc")
                .short('n')
                .long("nmc")
                .takes_value(true)
                .default_value("1")
                .help("number of trials"),
        )
        .arg(
            Arg::new("remainder")
                .long("remainder")
                .takes_value(true)
                .possible_values(["reject", "drop", "last-worker"])
                .default_value("reject"),
        )
        .arg(Arg::new("seed").long("seed").takes_value(true).default_value("10"))
        .arg(
            Arg::new("noise_seed")
                .long("noise-seed")
                .takes_value(true)
                .default_value("10"),
        )
        .arg(
            Arg::new("seed_scheme")
                .long("seed-scheme")
                .takes_value(true)
                .possible_values(["hashed", "legacy"])
                .default_value("hashed"),
        )
        .get_matches();

    let inst_file = matches.value_of("inst_file").context("missing --inst_file")?;
    let inst: InstrumentCfg = serde_yaml::from_reader(File::open(inst_file).context("open instrument file")?)?;
    let nworkers = matches.value_of("nworkers").unwrap_or("1").parse::<usize>()?;
    let nmc = matches.value_of("nmc").unwrap_or("1").parse::<usize>()?;
    let remainder = matches.value_of("remainder").unwrap_or("reject").parse::<RemainderPolicy>()?;
    let seed = matches.value_of("seed").unwrap_or("10").parse::<u64>()?;
    let noise_seed = matches.value_of("noise_seed").unwrap_or("10").parse::<u64>()?;
    let scheme = matches.value_of("seed_scheme").unwrap_or("hashed").parse::<SeedScheme>()?;

    let partitioner = WorkPartitioner::new(inst.channels.len(), nworkers, remainder)?;
    let plan = SeedPlan::new(&partitioner, seed, noise_seed, scheme);

    println!("{:>5} {:>5} {:>8} {:>5} {:>12} {:>22}", "rank", "trial", "freq", "chan", "signal", "noise");
    for rank in 0..nworkers {
        for trial in 0..nmc {
            for channel in partitioner.channels_for(rank) {
                let unit = WorkUnit { trial, rank, channel };
                let seeds = plan.seeds(&unit);
                println!(
                    "{:>5} {:>5} {:>8} {:>5} {:>12} {:>22}",
                    rank, trial, inst.channels[channel].freq, channel, seeds.signal, seeds.noise
                );
            }
        }
    }
    let unassigned: Vec<usize> = partitioner.unassigned().collect();
    if !unassigned.is_empty() {
        println!("unassigned channels: {:?}", unassigned);
    }
    Ok(())
}
