//! Corner-tracking command line host
//!
//! Reads a parameter file and a corner-frame sequence, drives the tracker
//! one scan per frame, and writes the resulting track file.
//!
//! Exit codes: 0 on success, 1 for help/syntax, -1 for argument or I/O
//! errors.

use std::process::exit;

use clap::error::ErrorKind;
use clap::Parser;

use corner_mht::{
    io, read_params, ConstVelModel, ConstVelParams, MhtTracker, TextureMetric, TrackerError,
};

#[derive(Parser, Debug)]
#[command(
    name = "trackcorners",
    about = "Track corner features across frames with a multiple hypothesis tracker",
    disable_help_flag = true
)]
struct Args {
    /// The file that the track data is written to
    #[arg(short, long)]
    output: String,

    /// The file where the tracking parameters can be found
    #[arg(short, long, default_value = "./Parameters")]
    param: String,

    /// Control file: corner-file basename, frame range, and per-frame
    /// feature counts
    #[arg(short, long)]
    input: String,

    /// Directory to prepend to the corner files
    #[arg(short, long, default_value = ".")]
    dir: String,

    /// Print the syntax for running this program
    #[arg(short = 'x', long)]
    syntax: bool,

    /// Print this help page
    #[arg(short = 'h', long, action = clap::ArgAction::HelpLong)]
    help: Option<bool>,
}

fn print_syntax() {
    eprintln!(
        "trackcorners -o OUTFILE [-p PARAM_FILE] [-d DIRNAME] -i INFILE\n\
                      [--syntax | -x] [--help | -h]"
    );
}

fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            exit(1);
        }
        Err(err) => {
            eprintln!("ERROR: {}", err.kind());
            print_syntax();
            exit(-1);
        }
    };

    if args.syntax {
        print_syntax();
        exit(1);
    }

    if let Err(err) = run(&args) {
        eprintln!("ERROR: {}", err);
        exit(-1);
    }
}

fn run(args: &Args) -> Result<(), TrackerError> {
    let params = read_params(&args.param)?;
    log::info!("using parameter file {}", args.param);

    let batches = io::read_corners(&args.input, &args.dir)?;
    log::info!("read {} frames from {}", batches.len(), args.input);

    let model = ConstVelModel::new(ConstVelParams {
        position_variance_x: params.position_variance_x,
        position_variance_y: params.position_variance_y,
        intensity_variance: params.intensity_variance,
        process_variance: params.process_variance,
        start_prob: params.mean_new,
        lambda: params.prob_end,
        detect_prob: params.prob_detect,
        state_variance: params.state_variance,
        intensity_threshold: params.intensity_threshold,
        max_distance: params.max_distance_2,
        texture_metric: TextureMetric::Correlation,
    });

    let mut tracker = MhtTracker::new(
        params.max_depth,
        params.min_g_hypo_ratio,
        params.max_g_hypos,
        vec![model],
        params.mean_falarms.ln(),
        params.end_scan,
    );

    for batch in batches {
        tracker.add_reports(batch);
        tracker.scan();

        let stats = tracker.stats();
        log::info!(
            "scan {}/{}: {} trees, {} hypos in {} groups",
            tracker.current_time(),
            tracker.scan_end_time(),
            stats.trees,
            stats.group_hypos,
            stats.groups
        );

        if tracker.current_time() > tracker.scan_end_time() {
            break;
        }
    }

    log::info!("clearing remaining trees");
    tracker.clear();

    io::write_track_file(
        &args.output,
        &params,
        tracker.tracks(),
        tracker.false_alarms(),
    )?;
    log::info!(
        "wrote {} tracks and {} false alarms to {}",
        tracker.tracks().len(),
        tracker.false_alarms().len(),
        args.output
    );
    Ok(())
}
