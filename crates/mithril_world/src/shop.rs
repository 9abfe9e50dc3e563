use parking_lot::Mutex;

use crate::Definitions;

/// A shop's live stock. Prices scale with how far the current stock sits
/// from the baseline, so buying drives prices up and selling drives them
/// down.
pub struct Shop {
    pub name: String,
    stock: Mutex<Vec<ShopEntry>>,
    pub base_sale_percent: i32,
    pub base_purchase_percent: i32,
}

#[derive(Clone, Copy, Debug)]
pub struct ShopEntry {
    pub id: u32,
    pub amount: i32,
    pub baseline: i32,
}

impl Shop {
    pub fn new(
        name: impl Into<String>,
        stock: impl IntoIterator<Item = (u32, i32)>,
        base_sale_percent: i32,
        base_purchase_percent: i32,
    ) -> Self {
        Self {
            name: name.into(),
            stock: Mutex::new(
                stock
                    .into_iter()
                    .map(|(id, amount)| ShopEntry {
                        id,
                        amount,
                        baseline: amount,
                    })
                    .collect(),
            ),
            base_sale_percent,
            base_purchase_percent,
        }
    }

    pub fn entry(&self, id: u32) -> Option<ShopEntry> {
        self.stock.lock().iter().find(|e| e.id == id).copied()
    }

    pub fn stock_snapshot(&self) -> Vec<ShopEntry> {
        self.stock.lock().clone()
    }

    /// Percentage points the current stock is below its baseline.
    pub fn stock_delta_percent(&self, id: u32) -> i32 {
        self.entry(id)
            .map_or(0, |e| (e.baseline - e.amount) * 2)
    }

    /// The price a player pays to buy one unit right now.
    pub fn sale_price(&self, id: u32, defs: &Definitions) -> i32 {
        self.scaled_price(id, defs, self.base_sale_percent + self.stock_delta_percent(id))
    }

    /// The price the shop pays when a player sells one unit.
    pub fn purchase_price(&self, id: u32, defs: &Definitions) -> i32 {
        self.scaled_price(
            id,
            defs,
            self.base_purchase_percent + self.stock_delta_percent(id),
        )
    }

    fn scaled_price(&self, id: u32, defs: &Definitions, percent: i32) -> i32 {
        let base = defs.item(id).map_or(0, |d| d.base_price);
        (base * percent.max(10)) / 100
    }

    pub fn take_one(&self, id: u32) -> bool {
        let mut stock = self.stock.lock();
        match stock.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.amount > 0 => {
                entry.amount -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn put_one(&self, id: u32) {
        let mut stock = self.stock.lock();
        match stock.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.amount += 1,
            None => stock.push(ShopEntry {
                id,
                amount: 1,
                baseline: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemDef;

    fn defs() -> Definitions {
        let mut defs = Definitions::default();
        for id in 0..20 {
            defs.items.push(ItemDef {
                id,
                base_price: 100,
                ..ItemDef::default()
            });
        }
        defs
    }

    #[test]
    fn buying_raises_the_price() {
        let defs = defs();
        let shop = Shop::new("General Store", [(7, 5)], 130, 40);

        let before = shop.sale_price(7, &defs);
        assert!(shop.take_one(7));
        assert!(shop.sale_price(7, &defs) > before);
    }

    #[test]
    fn out_of_stock_cannot_be_taken() {
        let shop = Shop::new("General Store", [(7, 0)], 130, 40);
        assert!(!shop.take_one(7));
    }

    #[test]
    fn selling_restocks() {
        let shop = Shop::new("General Store", [], 130, 40);
        shop.put_one(3);
        assert_eq!(shop.entry(3).unwrap().amount, 1);
    }
}
