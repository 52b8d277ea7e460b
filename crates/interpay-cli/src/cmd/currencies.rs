//! `interpay currencies`.

use crate::table::Table;
use crate::ui;
use interpay_types::payment::Currency;

pub fn cmd_currencies() {
    ui::section("Supported currencies");
    let mut table = Table::new(&["Code", "Symbol", "Name"]);
    for currency in Currency::ALL {
        let marker = if currency == Currency::default() {
            format!("{} (default)", currency.name())
        } else {
            currency.name().to_string()
        };
        table.add_row(&[currency.code(), currency.symbol(), marker.as_str()]);
    }
    table.print();
}
