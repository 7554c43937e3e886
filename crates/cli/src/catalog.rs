//! Item catalog domain registered by the `graft` binary.
//!
//! Mods describe items (weapons are items too), recipes with effects
//! selected by their `type` key, and requirements told apart by their keys
//! alone. Any item may carry trade data through the `tradeable` extension.

use std::{any::Any, fmt};

use graft_core::{
    document::EventSource,
    error::LoadError,
    materialize::{require_member, Materialize, Materializer},
    pipeline::{DomainObject, DomainStore, Extension, Root, Subject, SubjectNode, TypeKey},
    registry::Registrar,
    resolve::{Poly, Polymorphic},
    schema::{Member, Schema},
};

/// A catalog entry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub value: u32,
    pub weight: f64,
    pub price: Option<u32>,
}

impl DomainObject for Item {}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Weapon {
    pub item: Item,
    pub damage: u32,
}

impl DomainObject for Weapon {
    fn supertypes() -> Vec<TypeKey> {
        vec![TypeKey::of::<Item>()]
    }

    fn supertype_mut(&mut self, key: TypeKey) -> Option<&mut dyn Any> {
        (key == TypeKey::of::<Item>()).then_some(&mut self.item as &mut dyn Any)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Recipe {
    pub name: String,
    pub output: String,
    pub effects: Vec<String>,
    pub requirement: Option<String>,
}

impl DomainObject for Recipe {}

#[derive(Debug)]
pub struct ItemNode {
    name: String,
    value: Option<u32>,
    weight: Option<f64>,
}

impl Schema for ItemNode {
    const NAME: &'static str = "item";
    const MEMBERS: &'static [Member] = &[
        Member::new("name"),
        Member::new("value"),
        Member::new("weight"),
    ];
}

impl Materialize for ItemNode {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut name: Option<String> = None;
        let mut value = None;
        let mut weight = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "name" => name = Some(cx.read(events)?),
                "value" => value = Some(cx.read(events)?),
                _ => weight = Some(cx.read(events)?),
            }
            Ok(())
        })?;
        Ok(ItemNode {
            name: require_member(name, "name", Self::NAME, cx.convention(), summary.span)?,
            value,
            weight,
        })
    }
}

impl SubjectNode for ItemNode {
    type Object = Item;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Item {
        Item {
            name: self.name.clone(),
            ..Item::default()
        }
    }

    fn apply(&self, item: &mut Item) -> Result<(), LoadError> {
        if let Some(value) = self.value {
            item.value = value;
        }
        if let Some(weight) = self.weight {
            item.weight = weight;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct WeaponNode {
    name: String,
    value: Option<u32>,
    damage: u32,
}

impl Schema for WeaponNode {
    const NAME: &'static str = "weapon";
    const MEMBERS: &'static [Member] = &[
        Member::new("name"),
        Member::new("value"),
        Member::aliased("damage", &["dmg"]),
    ];
}

impl Materialize for WeaponNode {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut name: Option<String> = None;
        let mut value = None;
        let mut damage: Option<u32> = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "name" => name = Some(cx.read(events)?),
                "value" => value = Some(cx.read(events)?),
                _ => damage = Some(cx.read(events)?),
            }
            Ok(())
        })?;
        let convention = cx.convention();
        Ok(WeaponNode {
            name: require_member(name, "name", Self::NAME, convention, summary.span)?,
            value,
            damage: require_member(damage, "damage", Self::NAME, convention, summary.span)?,
        })
    }
}

impl SubjectNode for WeaponNode {
    type Object = Weapon;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Weapon {
        Weapon {
            item: Item {
                name: self.name.clone(),
                ..Item::default()
            },
            damage: 0,
        }
    }

    fn apply(&self, weapon: &mut Weapon) -> Result<(), LoadError> {
        weapon.damage = self.damage;
        if let Some(value) = self.value {
            weapon.item.value = value;
        }
        Ok(())
    }
}

/// Trade data attachable to any item.
#[derive(Debug)]
pub struct Tradeable {
    price: Option<u32>,
}

impl Schema for Tradeable {
    const NAME: &'static str = "tradeable";
    const MEMBERS: &'static [Member] = &[Member::new("price")];
}

impl Materialize for Tradeable {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut price = None;
        cx.read_mapping::<Self>(events, |cx, _, events| {
            price = cx.read(events)?;
            Ok(())
        })?;
        Ok(Tradeable { price })
    }
}

impl Extension for Tradeable {
    type Target = Item;

    fn apply(&self, item: &mut Item) -> Result<(), LoadError> {
        if self.price.is_some() {
            item.price = self.price;
        }
        Ok(())
    }
}

/// What consuming a recipe's output does.
pub trait Effect: fmt::Debug {
    fn describe(&self) -> String;
}

impl Polymorphic for dyn Effect {
    const NAME: &'static str = "effect";
    const DISCRIMINATOR: Option<&'static str> = Some("type");
}

#[derive(Debug)]
struct Heal {
    amount: u32,
}

impl Schema for Heal {
    const NAME: &'static str = "heal";
    const MEMBERS: &'static [Member] = &[Member::new("amount")];
}

impl Materialize for Heal {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut amount = None;
        let summary = cx.read_mapping::<Self>(events, |cx, _, events| {
            amount = Some(cx.read(events)?);
            Ok(())
        })?;
        Ok(Heal {
            amount: require_member(amount, "amount", Self::NAME, cx.convention(), summary.span)?,
        })
    }
}

impl Effect for Heal {
    fn describe(&self) -> String {
        format!("heal {}", self.amount)
    }
}

#[derive(Debug)]
struct Damage {
    amount: u32,
    element: Option<String>,
}

impl Schema for Damage {
    const NAME: &'static str = "damage";
    const MEMBERS: &'static [Member] = &[Member::new("amount"), Member::new("element")];
}

impl Materialize for Damage {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut amount = None;
        let mut element = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "amount" => amount = Some(cx.read(events)?),
                _ => element = cx.read(events)?,
            }
            Ok(())
        })?;
        Ok(Damage {
            amount: require_member(amount, "amount", Self::NAME, cx.convention(), summary.span)?,
            element,
        })
    }
}

impl Effect for Damage {
    fn describe(&self) -> String {
        match &self.element {
            Some(element) => format!("{} {element} damage", self.amount),
            None => format!("{} damage", self.amount),
        }
    }
}

/// Gate on crafting a recipe, recognized by its keys.
pub trait Requirement: fmt::Debug {
    fn describe(&self) -> String;
}

impl Polymorphic for dyn Requirement {
    const NAME: &'static str = "requirement";
    const DUCK_CANDIDATES: &'static [&'static str] = &["level_requirement", "skill_requirement"];
}

#[derive(Debug)]
struct LevelRequirement {
    level: u32,
}

impl Schema for LevelRequirement {
    const NAME: &'static str = "level_requirement";
    const MEMBERS: &'static [Member] = &[Member::new("level")];
}

impl Materialize for LevelRequirement {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut level = None;
        let summary = cx.read_mapping::<Self>(events, |cx, _, events| {
            level = Some(cx.read(events)?);
            Ok(())
        })?;
        Ok(LevelRequirement {
            level: require_member(level, "level", Self::NAME, cx.convention(), summary.span)?,
        })
    }
}

impl Requirement for LevelRequirement {
    fn describe(&self) -> String {
        format!("level {}", self.level)
    }
}

#[derive(Debug)]
struct SkillRequirement {
    skill: String,
    rank: u32,
}

impl Schema for SkillRequirement {
    const NAME: &'static str = "skill_requirement";
    const MEMBERS: &'static [Member] = &[Member::new("skill"), Member::new("rank")];
}

impl Materialize for SkillRequirement {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut skill: Option<String> = None;
        let mut rank = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "skill" => skill = Some(cx.read(events)?),
                _ => rank = Some(cx.read(events)?),
            }
            Ok(())
        })?;
        let convention = cx.convention();
        Ok(SkillRequirement {
            skill: require_member(skill, "skill", Self::NAME, convention, summary.span)?,
            rank: rank.unwrap_or(1),
        })
    }
}

impl Requirement for SkillRequirement {
    fn describe(&self) -> String {
        format!("{} rank {}", self.skill, self.rank)
    }
}

#[derive(Debug)]
pub struct RecipeNode {
    name: String,
    output: String,
    effects: Vec<Poly<dyn Effect>>,
    requires: Option<Poly<dyn Requirement>>,
}

impl Schema for RecipeNode {
    const NAME: &'static str = "recipe";
    const MEMBERS: &'static [Member] = &[
        Member::new("name"),
        Member::new("output"),
        Member::new("effects"),
        Member::new("requires"),
    ];
}

impl Materialize for RecipeNode {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut name: Option<String> = None;
        let mut output: Option<String> = None;
        let mut effects = Vec::new();
        let mut requires = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "name" => name = Some(cx.read(events)?),
                "output" => output = Some(cx.read(events)?),
                "effects" => effects = cx.read(events)?,
                _ => requires = cx.read(events)?,
            }
            Ok(())
        })?;
        let convention = cx.convention();
        Ok(RecipeNode {
            name: require_member(name, "name", Self::NAME, convention, summary.span)?,
            output: require_member(output, "output", Self::NAME, convention, summary.span)?,
            effects,
            requires,
        })
    }
}

impl SubjectNode for RecipeNode {
    type Object = Recipe;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Recipe {
        Recipe {
            name: self.name.clone(),
            ..Recipe::default()
        }
    }

    fn apply(&self, recipe: &mut Recipe) -> Result<(), LoadError> {
        recipe.output = self.output.clone();
        recipe.effects = self.effects.iter().map(|effect| effect.describe()).collect();
        recipe.requirement = self.requires.as_ref().map(|requirement| requirement.describe());
        Ok(())
    }
}

/// The `items` / `weapons` section of a mod.
pub struct Armory {
    pub items: Vec<Subject<ItemNode>>,
    pub weapons: Vec<Subject<WeaponNode>>,
}

impl Schema for Armory {
    const NAME: &'static str = "armory";
    const MEMBERS: &'static [Member] = &[Member::new("items"), Member::new("weapons")];
}

impl Materialize for Armory {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut armory = Armory {
            items: Vec::new(),
            weapons: Vec::new(),
        };
        cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "items" => armory.items = cx.read(events)?,
                _ => armory.weapons = cx.read(events)?,
            }
            Ok(())
        })?;
        Ok(armory)
    }
}

impl Root for Armory {}

/// The `recipes` section of a mod.
pub struct Cookbook {
    pub recipes: Vec<Subject<RecipeNode>>,
}

impl Schema for Cookbook {
    const NAME: &'static str = "cookbook";
    const MEMBERS: &'static [Member] = &[Member::new("recipes")];
}

impl Materialize for Cookbook {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut recipes = Vec::new();
        cx.read_mapping::<Self>(events, |cx, _, events| {
            recipes = cx.read(events)?;
            Ok(())
        })?;
        Ok(Cookbook { recipes })
    }
}

impl Root for Cookbook {}

pub fn register(registrar: &mut Registrar) {
    registrar
        .root::<Armory>()
        .root::<Cookbook>()
        .extension::<Tradeable>()
        .discriminated::<dyn Effect, Heal>("heal", |heal| Box::new(heal))
        .discriminated::<dyn Effect, Damage>("damage", |damage| Box::new(damage))
        .candidate::<dyn Requirement, LevelRequirement>(|level| Box::new(level))
        .candidate::<dyn Requirement, SkillRequirement>(|skill| Box::new(skill));
}

/// One line per catalog object, grouped by kind in creation order.
pub fn summarize(store: &DomainStore) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, item) in store.objects::<Item>() {
        let item = item.borrow();
        lines.push(format!(
            "item    {name}: value {} weight {}{}",
            item.value,
            item.weight,
            price_suffix(item.price)
        ));
    }
    for (name, weapon) in store.objects::<Weapon>() {
        let weapon = weapon.borrow();
        lines.push(format!(
            "weapon  {name}: damage {} value {}{}",
            weapon.damage,
            weapon.item.value,
            price_suffix(weapon.item.price)
        ));
    }
    for (name, recipe) in store.objects::<Recipe>() {
        let recipe = recipe.borrow();
        let mut line = format!("recipe  {name} -> {}", recipe.output);
        if !recipe.effects.is_empty() {
            line.push_str(&format!(" ({})", recipe.effects.join(", ")));
        }
        if let Some(requirement) = &recipe.requirement {
            line.push_str(&format!(" requires {requirement}"));
        }
        lines.push(line);
    }
    lines
}

fn price_suffix(price: Option<u32>) -> String {
    price.map(|price| format!(" price {price}")).unwrap_or_default()
}
