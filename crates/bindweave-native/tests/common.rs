use bindweave_layout::{AggregateCarrier, Carrier};
use bindweave_meta::QualifiedName;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Aggregate carrier made of consecutive scalars, each at its natural alignment.
pub fn aggregate(name: &str, fields: &[Carrier]) -> Carrier {
    let mut offset: usize = 0;
    let mut align = 1;
    let mut scalars = Vec::new();
    for carrier in fields {
        offset = offset.next_multiple_of(carrier.align());
        align = align.max(carrier.align());
        scalars.push((offset, carrier.clone()));
        offset += carrier.size();
    }
    Carrier::Aggregate(AggregateCarrier {
        name: QualifiedName::new("test", name),
        size: offset.next_multiple_of(align),
        align,
        scalars,
    })
}
