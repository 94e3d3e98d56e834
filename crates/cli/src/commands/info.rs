use crate::args::DeviceArgs;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use norsim::{Device, MtdInfo};

pub fn run(args: &DeviceArgs) -> anyhow::Result<()> {
    let device = Device::open(&args.to_config()?)?;
    let info = device.get_info();

    println!("\nDevice Info\n");
    println!("{}\n", info_table(&info, device.page_count()));
    Ok(())
}

pub fn info_table(info: &MtdInfo, pages: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Type".to_string(), format!("{} (NOR flash)", info.kind)]);
    table.add_row(vec!["Flags".to_string(), format!("0x{:X}", info.flags)]);
    table.add_row(vec!["Size".to_string(), format!("{} bytes", info.size)]);
    table.add_row(vec!["Erase size".to_string(), format!("{} bytes", info.erase_size)]);
    table.add_row(vec!["Write size".to_string(), info.write_size.to_string()]);
    table.add_row(vec!["OOB size".to_string(), info.oob_size.to_string()]);
    table.add_row(vec!["Pages".to_string(), pages.to_string()]);
    table
}
