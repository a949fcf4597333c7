use core::{fmt::Write, ops::DerefMut};

use super::{
    consts::{ENTRIES_PER_TABLE, NUM_LEVELS},
    paging::{Descriptor, TABLE_ADDR_MASK},
    pool::TablePool,
};

/// Writes every valid entry under the table at `table_pa`, one tab of indent per level.
///
/// `depth` is 0 for the root. Tables are followed down to level 3 and no further.
/// Sink errors are ignored, the output is only for reading.
pub fn dump<M: DerefMut<Target = [u8]>, W: Write>(
    pool: &TablePool<M>,
    table_pa: u64,
    depth: usize,
    out: &mut W,
) {
    indent(out, depth);
    let _ = writeln!(out, "base: {table_pa:#018x}");

    let table = match pool.table_at(table_pa & TABLE_ADDR_MASK) {
        Ok(table) => table,
        Err(err) => {
            indent(out, depth + 1);
            let _ = writeln!(out, "<{err}>");
            return;
        }
    };

    for index in 0..ENTRIES_PER_TABLE {
        let entry = pool.entry(table, index);
        if !entry.is_valid() {
            continue;
        }

        indent(out, depth + 1);
        let _ = writeln!(out, "{index:3}: {:#018x}", entry.raw());

        if let Descriptor::Table(next) = entry.decode(depth + 1) {
            if depth + 1 < NUM_LEVELS {
                dump(pool, next, depth + 1, out);
            }
        }
    }
}

fn indent<W: Write>(out: &mut W, depth: usize) {
    for _ in 0..depth {
        let _ = out.write_char('\t');
    }
}
