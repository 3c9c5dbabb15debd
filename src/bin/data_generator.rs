use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};

fn main() -> std::io::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/sales_1m.csv".to_string());
    let rows: usize = std::env::args()
        .nth(2)
        .and_then(|n| n.parse().ok())
        .unwrap_or(1_000_000);

    if let Some(parent) = std::path::Path::new(&path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "transaction_id,sale_date,customer_id,product_id,region,category,sale_amount"
    )?;

    let mut rng = rand::rng();
    for i in 0..rows {
        let day = rng.random_range(1..=28);
        let month = rng.random_range(1..=12);
        let customer = rng.random_range(1001..1100);
        let product = rng.random_range(101..120);
        let region = ["East", "West", "North", "South", "Central"][rng.random_range(0..5)];
        let category = ["Electronics", "Clothing", "Sports", "Home"][rng.random_range(0..4)];
        let amount: f64 = rng.random_range(5.0..2500.0);
        writeln!(
            writer,
            "{},2024-{:02}-{:02},{},{},{},{},{:.2}",
            i, month, day, customer, product, region, category, amount
        )?;
    }
    writer.flush()?;

    println!("Sample sales CSV generated: {} ({} rows)", path, rows);
    Ok(())
}
