pub mod number;
pub mod text;
pub mod time;

pub use number::{decimal_from_f64, format_decimal, parse_decimal, parse_quantity};
pub use text::{clean_code, clean_text, code_from_f64};
pub use time::{date_from_excel_serial, parse_date};
