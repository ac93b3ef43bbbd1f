//! CSV exports of an import run.

use std::io::Write;
use std::path::Path;

use crate::apply::RowLogEntry;
use crate::validator::RowError;

pub fn write_row_log<W: Write>(writer: W, log: &[RowLogEntry]) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["line", "action", "key", "order_id", "message"])?;
    for entry in log {
        let line = entry.line.to_string();
        out.write_record([
            line.as_str(),
            entry.action.as_str(),
            entry.key.as_deref().unwrap_or(""),
            entry.order_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            entry.message.as_str(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_errors<W: Write>(writer: W, errors: &[RowError]) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["line", "message"])?;
    for error in errors {
        out.write_record([error.line.to_string().as_str(), error.message.as_str()])?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_row_log(path: &Path, log: &[RowLogEntry]) -> Result<(), csv::Error> {
    write_row_log(std::fs::File::create(path)?, log)
}

pub fn save_errors(path: &Path, errors: &[RowError]) -> Result<(), csv::Error> {
    write_errors(std::fs::File::create(path)?, errors)
}

pub fn row_log_csv(log: &[RowLogEntry]) -> Result<String, csv::Error> {
    let mut buf = Vec::new();
    write_row_log(&mut buf, log)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn errors_csv(errors: &[RowError]) -> Result<String, csv::Error> {
    let mut buf = Vec::new();
    write_errors(&mut buf, errors)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::RowAction;
    use poflow_model::OrderId;

    #[test]
    fn row_log_is_quoted_csv() {
        let log = vec![
            RowLogEntry {
                line: 2,
                action: RowAction::Inserted,
                key: Some("OC-1".to_string()),
                order_id: Some(OrderId::from("abc")),
                message: "created with status HasPO".to_string(),
            },
            RowLogEntry {
                line: 3,
                action: RowAction::Skipped,
                key: Some("SC-4".to_string()),
                order_id: None,
                message: "requisition SC-4 already belongs to PO OC-1, skipped".to_string(),
            },
        ];
        let text = row_log_csv(&log).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "line,action,key,order_id,message");
        assert_eq!(lines[1], "2,inserted,OC-1,abc,created with status HasPO");
        assert_eq!(lines[2], "3,skipped,SC-4,,\"requisition SC-4 already belongs to PO OC-1, skipped\"");
    }

    #[test]
    fn errors_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erros.csv");
        save_errors(&path, &[RowError::new(5, "descricao is required")]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "line,message\n5,descricao is required\n");
    }
}
