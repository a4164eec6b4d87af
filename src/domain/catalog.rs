//! Pricing Catalog & Coupon Policy
//!
//! Static mapping from appliance type to base price and the processor-side
//! product identifier, plus the promotional rule that grants a complimentary
//! follow-up item for qualifying appliance types. Pure lookups, no state.

use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::aggregates::order::{ApplianceType, Arch};
use crate::domain::value_objects::Money;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub base_price: Money,
    pub external_product_id: String,
}

/// Catalog of appliance pricing. Lookups are total over the appliance enum;
/// a missing entry means the catalog and the data disagree and is surfaced as
/// a `Configuration` error rather than a default price.
#[derive(Clone, Debug)]
pub struct PricingCatalog {
    entries: HashMap<ApplianceType, CatalogEntry>,
}

impl PricingCatalog {
    /// The standard price list, in USD.
    pub fn standard() -> Self {
        let mut entries = HashMap::new();
        let mut put = |appliance: ApplianceType, cents: i64, product_id: &str| {
            entries.insert(appliance, CatalogEntry {
                base_price: Money::usd(Decimal::new(cents, 2)),
                external_product_id: product_id.to_string(),
            });
        };
        put(ApplianceType::SurgicalDay, 45000, "prod_surgical_day");
        put(ApplianceType::PrintedTryIn, 12000, "prod_printed_try_in");
        put(ApplianceType::Nightguard, 9500, "prod_nightguard");
        put(ApplianceType::DirectLoadPmma, 65000, "prod_direct_load_pmma");
        put(ApplianceType::DirectLoadZirconia, 110000, "prod_direct_load_zirconia");
        put(ApplianceType::TiBar, 90000, "prod_ti_bar");
        Self { entries }
    }

    fn entry(&self, appliance: ApplianceType) -> Result<&CatalogEntry> {
        self.entries.get(&appliance).ok_or_else(|| {
            Error::Configuration(format!("appliance type '{appliance}' is not in the pricing catalog"))
        })
    }

    pub fn base_price(&self, appliance: ApplianceType) -> Result<&Money> {
        Ok(&self.entry(appliance)?.base_price)
    }

    pub fn external_product_id(&self, appliance: ApplianceType) -> Result<&str> {
        Ok(self.entry(appliance)?.external_product_id.as_str())
    }

    /// Order total at creation time: the base price, doubled for a dual-arch
    /// order (both arches are produced).
    pub fn order_total(&self, appliance: ApplianceType, arch: Arch) -> Result<Money> {
        let base = self.base_price(appliance)?;
        Ok(match arch {
            Arch::Upper | Arch::Lower => base.clone(),
            Arch::Dual => base.multiply(2),
        })
    }
}

impl Default for PricingCatalog {
    fn default() -> Self { Self::standard() }
}

/// Coupon policy: a surgical-day case earns a complimentary printed try-in
/// follow-up. The code is derived from the order id, so no two orders can
/// share one.
pub fn coupon_for(appliance: ApplianceType, order_id: Uuid) -> Option<String> {
    match appliance {
        ApplianceType::SurgicalDay => {
            Some(format!("TRYIN-{}", &order_id.simple().to_string()[..12].to_uppercase()))
        }
        _ => None,
    }
}
