use crate::args::DeviceArgs;
use crate::commands::info::info_table;
use crate::script::{self, Op};
use norsim::mtd::{EraseInfo, MEMERASE, MEMGETINFO, MEMUNLOCK};
use norsim::{Device, MtdInfo, NorsimError, Report, ReportKind};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub op: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hex of the bytes returned by a read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    timestamp: String,
    info: MtdInfo,
    outcomes: &'a [Outcome],
    report: Report,
}

/// Execute a script against a fresh device. Per-op failures are recorded,
/// not propagated.
pub fn run(script_path: &Path, args: &DeviceArgs, json: bool) -> anyhow::Result<Vec<Outcome>> {
    let ops = script::load(script_path)?;
    let device = Device::open(&args.to_config()?)?;

    let mut outcomes = Vec::with_capacity(ops.len());
    for op in &ops {
        let outcome = execute(&device, op);
        if !json {
            print_outcome(&outcome);
            match op {
                Op::Info if outcome.ok => {
                    println!("{}", info_table(&device.get_info(), device.page_count()))
                }
                Op::Report => print!("{}", device.report(ReportKind::Detailed)),
                _ => {}
            }
        }
        outcomes.push(outcome);
    }

    let report = device.report(ReportKind::Detailed);
    if json {
        let summary = RunSummary {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            info: device.get_info(),
            outcomes: &outcomes,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let failed = outcomes.iter().filter(|o| !o.ok).count();
        println!("\n{} operations, {} failed\n", outcomes.len(), failed);
        print!("{report}");
    }

    Ok(outcomes)
}

pub fn execute(device: &Device, op: &Op) -> Outcome {
    let label = describe(op);
    let result = match op {
        Op::Read { offset, length } => device.read_at(*offset, *length).map(Some),
        Op::Write { offset, data } => device.write_at(*offset, data).map(|_| None),
        Op::Unlock { start, length } => erase_ioctl(device, MEMUNLOCK, *start, *length),
        Op::Erase { start, length } => erase_ioctl(device, MEMERASE, *start, *length),
        Op::Info => {
            let mut buf = [0u8; MtdInfo::SIZE];
            device.ioctl(MEMGETINFO, &mut buf).map(|_| None)
        }
        Op::Report => Ok(None),
    };

    match result {
        Ok(data) => Outcome {
            op: label,
            ok: true,
            errno: None,
            error: None,
            data: data.map(hex::encode),
        },
        Err(e) => Outcome {
            op: label,
            ok: false,
            errno: Some(e.errno()),
            error: Some(e.to_string()),
            data: None,
        },
    }
}

fn erase_ioctl(device: &Device, code: u64, start: u64, length: u64) -> norsim::Result<Option<Vec<u8>>> {
    let range = || NorsimError::InvalidRange { offset: start, length };
    let req = EraseInfo {
        start: u32::try_from(start).map_err(|_| range())?,
        length: u32::try_from(length).map_err(|_| range())?,
    };
    let mut buf = req.to_bytes();
    device.ioctl(code, &mut buf)?;
    Ok(None)
}

fn describe(op: &Op) -> String {
    match op {
        Op::Read { offset, length } => format!("read 0x{:X} {}", offset, length),
        Op::Write { offset, data } => format!("write 0x{:X} [{} bytes]", offset, data.len()),
        Op::Unlock { start, length } => format!("unlock 0x{:X} {}", start, length),
        Op::Erase { start, length } => format!("erase 0x{:X} {}", start, length),
        Op::Info => "info".to_string(),
        Op::Report => "report".to_string(),
    }
}

fn print_outcome(outcome: &Outcome) {
    match (&outcome.error, &outcome.data) {
        (Some(err), _) => println!(
            "✗ {:<28} errno={} {}",
            outcome.op,
            outcome.errno.unwrap_or_default(),
            err
        ),
        (None, Some(data)) => println!("✓ {:<28} {}", outcome.op, data),
        (None, None) => println!("✓ {}", outcome.op),
    }
}
