mod global {
    turf::style_sheet!("assets/global.css");
}

mod explorer {
    turf::style_sheet!("assets/explorer.css");
}

mod charts {
    turf::style_sheet!("assets/charts.css");
}

mod table {
    turf::style_sheet!("assets/table.css");
}

pub use charts::ClassName as Charts;
pub use explorer::ClassName as Explorer;
pub use table::ClassName as Table;

use std::sync::LazyLock;

pub static ALL: LazyLock<String> = LazyLock::new(|| {
    [
        global::STYLE_SHEET,
        explorer::STYLE_SHEET,
        charts::STYLE_SHEET,
        table::STYLE_SHEET,
    ]
    .join("\n")
});
