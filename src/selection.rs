use crate::prelude::*;
use std::collections::BTreeSet;

/// Records kept by an allow-list, plus the names it asked for but never saw.
#[derive(Debug, Default)]
pub struct Selection {
    pub records: Vec<IrRecord>,
    pub missing: Vec<SelectionWarning>,
}

/// Keep the records whose name is on `allow_list`, in source order.
///
/// An empty allow-list keeps everything.
pub fn select<S: AsRef<str>>(records: Vec<IrRecord>, allow_list: &[S]) -> Selection {
    if allow_list.is_empty() {
        return Selection {
            records,
            missing: Vec::new(),
        };
    }

    let wanted: BTreeSet<&str> = allow_list.iter().map(|name| name.as_ref()).collect();
    let records: Vec<IrRecord> = records
        .into_iter()
        .filter(|record| wanted.contains(record.name.as_str()))
        .collect();

    let found: BTreeSet<&str> = records.iter().map(|record| record.name.as_str()).collect();
    let missing: Vec<SelectionWarning> = wanted
        .difference(&found)
        .map(|name| SelectionWarning::Missing(name.to_string()))
        .collect();

    for warning in &missing {
        warn!("{}", warning);
    }

    Selection { records, missing }
}
