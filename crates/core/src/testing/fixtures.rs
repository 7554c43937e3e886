//! Small domains used by the unit tests.

use std::{any::Any, collections::BTreeMap, fmt};

use crate::{
    document::{EventSource, Span},
    error::LoadError,
    materialize::{require_member, Materialize, Materializer},
    pipeline::{DomainObject, Extension, Root, Subject, SubjectNode, TypeKey},
    registry::Registrar,
    resolve::Polymorphic,
    schema::{Member, Schema},
};

fn read_numbers<S: Schema>(
    cx: &mut Materializer<'_>,
    events: &mut dyn EventSource,
) -> Result<(BTreeMap<&'static str, f64>, Span), LoadError> {
    let mut values = BTreeMap::new();
    let summary = cx.read_mapping::<S>(events, |cx, member, events| {
        values.insert(member, cx.read::<f64>(events)?);
        Ok(())
    })?;
    Ok((values, summary.span))
}

fn required(
    values: &BTreeMap<&'static str, f64>,
    cx: &Materializer<'_>,
    ident: &'static str,
    owner: &'static str,
    span: Span,
) -> Result<f64, LoadError> {
    require_member(values.get(ident).copied(), ident, owner, cx.convention(), span)
}

// Shapes: discriminated by `kind`.

pub(crate) trait Shape: fmt::Debug {
    fn area(&self) -> f64;
}

impl Polymorphic for dyn Shape {
    const NAME: &'static str = "shape";
    const DISCRIMINATOR: Option<&'static str> = Some("kind");
}

pub(crate) trait Plain: fmt::Debug {}

impl Polymorphic for dyn Plain {
    const NAME: &'static str = "plain";
}

#[derive(Debug)]
pub(crate) struct Circle {
    radius: f64,
}

impl Schema for Circle {
    const NAME: &'static str = "circle";
    const MEMBERS: &'static [Member] = &[Member::new("radius")];
}

impl Materialize for Circle {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let (values, span) = read_numbers::<Self>(cx, events)?;
        Ok(Circle {
            radius: required(&values, cx, "radius", Self::NAME, span)?,
        })
    }
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }
}

impl Plain for Circle {}

#[derive(Debug)]
pub(crate) struct Square {
    side: f64,
}

impl Schema for Square {
    const NAME: &'static str = "square";
    const MEMBERS: &'static [Member] = &[Member::new("side")];
}

impl Materialize for Square {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let (values, span) = read_numbers::<Self>(cx, events)?;
        Ok(Square {
            side: required(&values, cx, "side", Self::NAME, span)?,
        })
    }
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

impl Plain for Square {}

pub(crate) fn register_shapes(registrar: &mut Registrar) {
    registrar
        .discriminated::<dyn Shape, Circle>("circle", |circle| Box::new(circle))
        .discriminated::<dyn Shape, Square>("square", |square| Box::new(square))
        .candidate::<dyn Plain, Circle>(|circle| Box::new(circle))
        .candidate::<dyn Plain, Square>(|square| Box::new(square));
}

// Labels: discriminated by `type`, registered as foo then bar.

pub(crate) trait Label: fmt::Debug {
    fn render(&self) -> String;
}

impl Polymorphic for dyn Label {
    const NAME: &'static str = "label";
    const DISCRIMINATOR: Option<&'static str> = Some("type");
}

macro_rules! label {
    ($ty:ident, $name:literal, $prefix:literal) => {
        #[derive(Debug)]
        pub(crate) struct $ty {
            text: String,
        }

        impl Schema for $ty {
            const NAME: &'static str = $name;
            const MEMBERS: &'static [Member] = &[Member::new("text")];
        }

        impl Materialize for $ty {
            fn materialize(
                cx: &mut Materializer<'_>,
                events: &mut dyn EventSource,
            ) -> Result<Self, LoadError> {
                let mut text: Option<String> = None;
                let summary = cx.read_mapping::<Self>(events, |cx, _, events| {
                    text = Some(cx.read(events)?);
                    Ok(())
                })?;
                Ok($ty {
                    text: require_member(text, "text", Self::NAME, cx.convention(), summary.span)?,
                })
            }
        }

        impl Label for $ty {
            fn render(&self) -> String {
                format!("{}:{}", $prefix, self.text)
            }
        }
    };
}

label!(FooLabel, "foo_label", "foo");
label!(BarLabel, "bar_label", "bar");

pub(crate) fn register_labels(registrar: &mut Registrar) {
    registrar
        .discriminated::<dyn Label, FooLabel>("foo", |label| Box::new(label))
        .discriminated::<dyn Label, BarLabel>("bar", |label| Box::new(label));
}

// Sensors: duck-typed between c1 {a, b} and c2 {a, b, c}.

pub(crate) trait Sensor: fmt::Debug {
    fn kind(&self) -> &'static str;
}

impl Polymorphic for dyn Sensor {
    const NAME: &'static str = "sensor";
    const DUCK_CANDIDATES: &'static [&'static str] = &["c1", "c2"];
}

#[derive(Debug)]
pub(crate) struct C1;

impl Schema for C1 {
    const NAME: &'static str = "c1";
    const MEMBERS: &'static [Member] = &[Member::new("a"), Member::new("b")];
}

impl Materialize for C1 {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        read_numbers::<Self>(cx, events)?;
        Ok(C1)
    }
}

impl Sensor for C1 {
    fn kind(&self) -> &'static str {
        "c1"
    }
}

#[derive(Debug)]
pub(crate) struct C2;

impl Schema for C2 {
    const NAME: &'static str = "c2";
    const MEMBERS: &'static [Member] = &[Member::new("a"), Member::new("b"), Member::new("c")];
}

impl Materialize for C2 {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        read_numbers::<Self>(cx, events)?;
        Ok(C2)
    }
}

impl Sensor for C2 {
    fn kind(&self) -> &'static str {
        "c2"
    }
}

pub(crate) fn register_sensors(registrar: &mut Registrar) {
    registrar
        .candidate::<dyn Sensor, C1>(|sensor| Box::new(sensor))
        .candidate::<dyn Sensor, C2>(|sensor| Box::new(sensor));
}

// Garage: vehicles, cars as a vehicle subtype, and two extensions.

#[derive(Debug, Default)]
pub(crate) struct Vehicle {
    pub(crate) name: String,
    pub(crate) wheels: u32,
    pub(crate) color: Option<String>,
}

impl DomainObject for Vehicle {}

#[derive(Debug, Default)]
pub(crate) struct Car {
    pub(crate) vehicle: Vehicle,
    pub(crate) doors: u32,
    pub(crate) trunk_volume: u32,
}

impl DomainObject for Car {
    fn supertypes() -> Vec<TypeKey> {
        vec![TypeKey::of::<Vehicle>()]
    }

    fn supertype_mut(&mut self, key: TypeKey) -> Option<&mut dyn Any> {
        (key == TypeKey::of::<Vehicle>()).then_some(&mut self.vehicle as &mut dyn Any)
    }
}

#[derive(Debug)]
pub(crate) struct VehicleNode {
    name: String,
    wheels: Option<u32>,
}

impl Schema for VehicleNode {
    const NAME: &'static str = "vehicle";
    const MEMBERS: &'static [Member] = &[Member::new("name"), Member::new("wheels")];
}

impl Materialize for VehicleNode {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut name: Option<String> = None;
        let mut wheels = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "name" => name = Some(cx.read(events)?),
                _ => wheels = Some(cx.read(events)?),
            }
            Ok(())
        })?;
        Ok(VehicleNode {
            name: require_member(name, "name", Self::NAME, cx.convention(), summary.span)?,
            wheels,
        })
    }
}

impl SubjectNode for VehicleNode {
    type Object = Vehicle;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Vehicle {
        Vehicle {
            name: self.name.clone(),
            ..Vehicle::default()
        }
    }

    fn apply(&self, object: &mut Vehicle) -> Result<(), LoadError> {
        object.wheels = self.wheels.unwrap_or(4);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct CarNode {
    name: String,
    doors: u32,
}

impl Schema for CarNode {
    const NAME: &'static str = "car";
    const MEMBERS: &'static [Member] = &[Member::new("name"), Member::new("doors")];
}

impl Materialize for CarNode {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut name: Option<String> = None;
        let mut doors: Option<u32> = None;
        let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "name" => name = Some(cx.read(events)?),
                _ => doors = Some(cx.read(events)?),
            }
            Ok(())
        })?;
        let convention = cx.convention();
        Ok(CarNode {
            name: require_member(name, "name", Self::NAME, convention, summary.span)?,
            doors: require_member(doors, "doors", Self::NAME, convention, summary.span)?,
        })
    }
}

impl SubjectNode for CarNode {
    type Object = Car;

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Car {
        Car {
            vehicle: Vehicle {
                name: self.name.clone(),
                wheels: 4,
                color: None,
            },
            ..Car::default()
        }
    }

    fn apply(&self, object: &mut Car) -> Result<(), LoadError> {
        object.doors = self.doors;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Paint {
    pub(crate) color: Option<String>,
}

impl Schema for Paint {
    const NAME: &'static str = "paint";
    const MEMBERS: &'static [Member] = &[Member::new("color")];
}

impl Materialize for Paint {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut color = None;
        cx.read_mapping::<Self>(events, |cx, _, events| {
            color = cx.read(events)?;
            Ok(())
        })?;
        Ok(Paint { color })
    }
}

impl Extension for Paint {
    type Target = Vehicle;

    fn apply(&self, target: &mut Vehicle) -> Result<(), LoadError> {
        if let Some(color) = &self.color {
            target.color = Some(color.clone());
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Trunk {
    trunk_volume: Option<u32>,
}

impl Schema for Trunk {
    const NAME: &'static str = "trunk";
    const MEMBERS: &'static [Member] = &[Member::new("trunk_volume")];
}

impl Materialize for Trunk {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut trunk_volume = None;
        cx.read_mapping::<Self>(events, |cx, _, events| {
            trunk_volume = cx.read(events)?;
            Ok(())
        })?;
        Ok(Trunk { trunk_volume })
    }
}

impl Extension for Trunk {
    type Target = Car;

    fn apply(&self, target: &mut Car) -> Result<(), LoadError> {
        if let Some(volume) = self.trunk_volume {
            target.trunk_volume = volume;
        }
        Ok(())
    }
}

pub(crate) struct Garage {
    pub(crate) vehicles: Vec<Subject<VehicleNode>>,
    pub(crate) cars: Vec<Subject<CarNode>>,
}

impl Schema for Garage {
    const NAME: &'static str = "garage";
    const MEMBERS: &'static [Member] = &[Member::new("vehicles"), Member::new("cars")];
}

impl Materialize for Garage {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut garage = Garage {
            vehicles: Vec::new(),
            cars: Vec::new(),
        };
        cx.read_mapping::<Self>(events, |cx, member, events| {
            match member {
                "vehicles" => garage.vehicles = cx.read(events)?,
                _ => garage.cars = cx.read(events)?,
            }
            Ok(())
        })?;
        Ok(garage)
    }
}

impl Root for Garage {}

pub(crate) struct Fleet {
    pub(crate) fleet_name: Option<String>,
}

impl Schema for Fleet {
    const NAME: &'static str = "fleet";
    const MEMBERS: &'static [Member] = &[Member::new("fleet_name")];
}

impl Materialize for Fleet {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut fleet_name = None;
        cx.read_mapping::<Self>(events, |cx, _, events| {
            fleet_name = cx.read(events)?;
            Ok(())
        })?;
        Ok(Fleet { fleet_name })
    }
}

impl Root for Fleet {}

pub(crate) fn register_garage(registrar: &mut Registrar) {
    registrar
        .root::<Garage>()
        .root::<Fleet>()
        .extension::<Paint>()
        .extension::<Trunk>();
}
