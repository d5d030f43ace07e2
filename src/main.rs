use assisted_performer::midi::device::{list_input_ports, list_output_ports};
use assisted_performer::midi::{MidiInputSource, MidiOutputSink, all_notes_off};
use assisted_performer::sequencer::SharedSequence;
use assisted_performer::serialization::load_score;
use assisted_performer::{
    Assistant, EventLoop, MonotonicClock, PerformerConfig, PerformerResult, SharedSink,
    SpanOptions, create_input_channel,
};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

const USAGE: &str = "Usage: performer <score.ron|score.json> [--assisted] [--from MS] [--to MS] \
[--mute TRACK]... [--config PATH] [--output PORT] [--input PORT]\n       performer --list-ports";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    score: Option<PathBuf>,
    assisted: bool,
    list_ports: bool,
    from_ms: i64,
    to_ms: Option<i64>,
    muted: Vec<usize>,
    config: Option<PathBuf>,
    output_port: Option<String>,
    input_port: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
        args.next().ok_or_else(|| format!("{} needs a value", flag))
    }
    fn number<T: std::str::FromStr>(text: String, flag: &str) -> Result<T, String> {
        text.parse()
            .map_err(|_| format!("{} expects a number, got '{}'", flag, text))
    }

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--assisted" => parsed.assisted = true,
            "--list-ports" => parsed.list_ports = true,
            "--from" => parsed.from_ms = number(value(&mut args, &arg)?, &arg)?,
            "--to" => parsed.to_ms = Some(number(value(&mut args, &arg)?, &arg)?),
            "--mute" => parsed.muted.push(number(value(&mut args, &arg)?, &arg)?),
            "--config" => parsed.config = Some(PathBuf::from(value(&mut args, &arg)?)),
            "--output" => parsed.output_port = Some(value(&mut args, &arg)?),
            "--input" => parsed.input_port = Some(value(&mut args, &arg)?),
            flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
            _ if parsed.score.is_none() => parsed.score = Some(PathBuf::from(arg.as_str())),
            _ => return Err(format!("unexpected argument {}", arg)),
        }
    }

    if !parsed.list_ports && parsed.score.is_none() {
        return Err("missing score file".into());
    }
    Ok(parsed)
}

fn print_ports() {
    println!("MIDI inputs:");
    for port in list_input_ports() {
        println!("  [{}] {}", port.index, port.name);
    }
    println!("MIDI outputs:");
    for port in list_output_ports() {
        println!("  [{}] {}", port.index, port.name);
    }
}

fn perform(args: CliArgs) -> PerformerResult<()> {
    let mut config = match &args.config {
        Some(path) => PerformerConfig::load(path)?,
        None => PerformerConfig::load_or_default()?,
    };
    if args.output_port.is_some() {
        config.output_port = args.output_port.clone();
    }
    if args.input_port.is_some() {
        config.input_port = args.input_port.clone();
    }

    let clock = MonotonicClock::shared();
    let score = args.score.clone().unwrap_or_default();
    let mut sequence = load_score(&score, clock.clone())?;
    sequence.set_lookahead(config.lookahead_ms);

    let tracks_on: Vec<bool> = (0..sequence.tracks().len())
        .map(|t| !args.muted.contains(&t))
        .collect();
    let to_ms = args.to_ms.unwrap_or(i64::MAX);

    let output = Rc::new(RefCell::new(MidiOutputSink::connect(config.output_port.as_deref())?));
    let sink: SharedSink = output.clone();
    let on_position = Rc::new(|position: i64| log::info!("Position {} ms", position));

    let (input_tx, mut input_rx) = create_input_channel(config.input_queue_capacity);

    if args.assisted {
        let _input = MidiInputSource::connect(config.input_port.as_deref(), input_tx)?;
        let ended = Rc::new(Cell::new(false));
        let ended_flag = ended.clone();
        let assistant = Assistant::new(
            &sequence,
            config.assistant.clone(),
            Rc::new(move || ended_flag.set(true)),
            on_position,
        )?;

        let mut event_loop = EventLoop::assisted(assistant, clock).with_idle_poll(config.idle_poll_ms);
        event_loop.start_assisted(sink, args.from_ms, to_ms, tracks_on)?;
        println!("Ready: play the live performer's part on {}", output.borrow().port_name());
        event_loop.run(&mut input_rx, |l| !(ended.get() && l.is_finished()));
    } else {
        drop(input_tx);
        let mut event_loop = EventLoop::free(sequence).with_idle_poll(config.idle_poll_ms);
        event_loop.play_span(
            SpanOptions::new()
                .span(args.from_ms, to_ms)
                .sink(sink)
                .tracks_on(tracks_on)
                .on_position(on_position)
                .on_end(Rc::new(|_: Option<SharedSequence>, duration: u64| {
                    log::info!("Performance finished after {} ms", duration)
                })),
        )?;
        event_loop.run(&mut input_rx, |l| !l.is_finished());
    }

    all_notes_off(&mut *output.borrow_mut(), 0.0);
    Ok(())
}

fn main() {
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("ERROR: {}\n{}", e, USAGE);
            process::exit(2);
        }
    };

    if args.list_ports {
        print_ports();
        return;
    }

    if let Err(e) = perform(args) {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_free_performance() {
        let parsed = args(&["score.ron", "--from", "1000", "--to", "5000", "--mute", "2"]).unwrap();
        assert_eq!(parsed.score, Some(PathBuf::from("score.ron")));
        assert_eq!(parsed.from_ms, 1000);
        assert_eq!(parsed.to_ms, Some(5000));
        assert_eq!(parsed.muted, vec![2]);
        assert!(!parsed.assisted);
    }

    #[test]
    fn test_parse_assisted_with_ports() {
        let parsed = args(&["--assisted", "s.json", "--input", "Keys", "--output", "Synth"]).unwrap();
        assert!(parsed.assisted);
        assert_eq!(parsed.input_port.as_deref(), Some("Keys"));
        assert_eq!(parsed.output_port.as_deref(), Some("Synth"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(args(&[]).is_err());
        assert!(args(&["a.ron", "--from"]).is_err());
        assert!(args(&["a.ron", "--from", "soon"]).is_err());
        assert!(args(&["a.ron", "b.ron"]).is_err());
        assert!(args(&["a.ron", "--loud"]).is_err());
        assert!(args(&["--list-ports"]).unwrap().list_ports);
    }
}
