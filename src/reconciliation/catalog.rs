//! Master data hygiene.

use std::collections::BTreeMap;

use super::{CheckContext, Finding, InvariantCheck, Severity};

/// Groups `(id, name)` pairs by case- and space-insensitive name, keeping groups of two or more.
fn duplicate_names<'a, I>(entries: I) -> BTreeMap<String, Vec<&'a str>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (id, name) in entries {
        let key = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if !key.is_empty() {
            groups.entry(key).or_default().push(id);
        }
    }
    groups.retain(|_, ids| ids.len() > 1);
    groups
}

pub struct DuplicatePartnerNames;

impl InvariantCheck for DuplicatePartnerNames {
    fn id(&self) -> &'static str {
        "duplicate-partner-names"
    }

    fn description(&self) -> &'static str {
        "Several partners share a name"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let partners = ctx
            .snapshot
            .partners
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str()));
        duplicate_names(partners)
            .into_iter()
            .map(|(name, ids)| {
                self.finding(
                    format!("Partner name '{}' is used by {}", name, ids.join(", ")),
                    ids.into_iter().map(str::to_string).collect(),
                )
            })
            .collect()
    }
}

pub struct DuplicateProductNames;

impl InvariantCheck for DuplicateProductNames {
    fn id(&self) -> &'static str {
        "duplicate-product-names"
    }

    fn description(&self) -> &'static str {
        "Several products share a name"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let products = ctx
            .snapshot
            .products
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str()));
        duplicate_names(products)
            .into_iter()
            .map(|(name, ids)| {
                self.finding(
                    format!("Product name '{}' is used by {}", name, ids.join(", ")),
                    ids.into_iter().map(str::to_string).collect(),
                )
            })
            .collect()
    }
}

/// A lot's subgroup is copied from its product at creation and should follow it.
pub struct LotSubgroupDrift;

impl InvariantCheck for LotSubgroupDrift {
    fn id(&self) -> &'static str {
        "lot-subgroup-drift"
    }

    fn description(&self) -> &'static str {
        "Lot subgroup differs from product"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let products = ctx.snapshot.products_by_id();
        ctx.snapshot
            .lots
            .iter()
            .filter_map(|lot| {
                let product = products.get(lot.product_id.as_str())?;
                (lot.subgroup != product.subgroup).then(|| {
                    self.finding(
                        format!(
                            "Lot {} of {} has subgroup {:?}, product has {:?}",
                            lot.lot_key(),
                            lot.product_id,
                            lot.subgroup,
                            product.subgroup
                        ),
                        vec![lot.id.to_string(), lot.product_id.clone()],
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::Snapshot;
    use super::*;
    use chrono::Utc;

    fn ctx(snapshot: &Snapshot) -> CheckContext<'_> {
        CheckContext {
            snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        }
    }

    #[test]
    fn names_compare_loosely() {
        let mut snapshot = empty();
        snapshot.partners.push(partner("C1", "City  Clinic"));
        snapshot.partners.push(partner("C2", "city clinic"));
        snapshot.partners.push(partner("C3", "Other"));
        snapshot.products.push(product("SAL-1", "Saline"));
        snapshot.products.push(product("SAL-2", "Gauze"));

        let findings = DuplicatePartnerNames.run(&ctx(&snapshot));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].entity_ids, vec!["C1", "C2"]);
        assert!(DuplicateProductNames.run(&ctx(&snapshot)).is_empty());
    }

    #[test]
    fn subgroup_drift() {
        let mut snapshot = empty();
        snapshot.products.push(product("SAL-1", "Saline"));
        let mut moved = lot("SAL-1", 1, 0);
        moved.subgroup = Some("consumable".into());
        snapshot.lots.push(moved);
        snapshot.lots.push(lot("SAL-1", 1, 0));
        snapshot.lots.push(lot("ORPHAN", 1, 0));

        assert_eq!(LotSubgroupDrift.run(&ctx(&snapshot)).len(), 1);
    }
}
