//! The authoritative source of records, consulted on a cold cache.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::cache::Cacheable;
use crate::record::Record;

#[derive(Debug, Error)]
pub enum OriginError {
  #[error("origin source unavailable: {0}")]
  Unavailable(String),
}

/// Supplies the full collection. May be slow; no pagination.
#[async_trait]
pub trait OriginSource: Send + Sync {
  type Item: Cacheable;

  async fn fetch_all(&self) -> Result<Vec<Self::Item>, OriginError>;
}

/// Stand-in for an overloaded database: answers with a fixed set of
/// articles after a delay.
pub struct SampleOrigin {
  delay: Duration,
}

impl SampleOrigin {
  pub fn new(delay: Duration) -> Self {
    Self { delay }
  }
}

impl Default for SampleOrigin {
  fn default() -> Self {
    Self::new(Duration::from_secs(3))
  }
}

#[async_trait]
impl OriginSource for SampleOrigin {
  type Item = Record;

  async fn fetch_all(&self) -> Result<Vec<Record>, OriginError> {
    debug!(delay_ms = self.delay.as_millis() as u64, "querying origin");
    tokio::time::sleep(self.delay).await;
    Ok(sample_records())
  }
}

fn at(day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
  NaiveDate::from_ymd_opt(2021, 9, day)
    .and_then(|d| d.and_hms_opt(hour, min, sec))
    .unwrap_or_default()
}

fn sample_records() -> Vec<Record> {
  vec![
    Record::new(
      0,
      "Stavby dálnic na Moravě jsou začarované, hájila se v debatě Schillerová",
      at(2, 15, 54, 2),
      "Uštěpačné útoky, ostřejší výměny názorů, povzdechy, ale také úsměvy, to vše v kulisách pětihvězdičkového hotelu Barceló. Tak to ve středu v podvečer vypadalo v Brně na...",
      "https://1gr.cz/fotky/idnes/21/091/sp5/MOS8dd1ec_175742_4007616.jpg",
    ),
    Record::new(
      1,
      "Nefunguje to. V Africe končí testy vakcíny proti HIV, účinnost je 25 procent",
      at(2, 8, 30, 52),
      "Věda přišla o další naději v boji proti HIV. Farmaceutická společnost Johnson & Johnson oznámila, že zastavuje klinické testy prováděné na jihu Afriky, protože zjištěná...",
      "https://1gr.cz/fotky/idnes/21/091/sp5/JB83eaaa_Depositphotos_223807722_xl_2015.jpg",
    ),
    Record::new(
      2,
      "Pavel Novotný dostal půl roku vězení s podmínkou. Za pronásledování a vydírání",
      at(1, 16, 5, 32),
      "Starosta Řeporyjí Pavel Novotný dostal za výtržnictví, podněcování k trestnému činu a nebezpečné pronásledování podnikatele Marka Víta půlroční trest s dvouletou...",
      "https://1gr.cz/fotky/bulvar/21/084/sp5/REN8dc278__VO_5881.JPG",
    ),
    Record::new(
      3,
      "Soud se zastal lidí s protilátkami. Ministerstvo si samo protiřečilo",
      at(3, 10, 20, 0),
      "Stát si podle čtvrtečního rozsudku Nejvyššího správního soudu protiřečí, když uznává protilátky lidem s prodělaným onemocněním covid-19, ale ne těm, kteří si je...",
      "https://1gr.cz/fotky/idnes/20/022/sp5/KUC815e6e_profimedia_0494225439.jpg",
    ),
    Record::new(
      4,
      "Covid Čechy nesrazí, mají dost protilátek, říká imunolog. I díky očkování",
      at(3, 8, 12, 0),
      "Podzimní vlny covidu se nemusíme bát, míní imunolog Vojtěch Thon. Většina Čechů má podle něj silnou imunitu. Studie jeho týmu na 30 tisících lidech ukázala, že na konci...",
      "https://1gr.cz/fotky/idnes/21/091/sp5/IHA8dd3ce_B_B_JIHLAVA_10536120.jpg",
    ),
    Record::new(
      5,
      "O2 arena se otevírá s megashow QUEEN RELIVED by Queenie!",
      at(3, 7, 50, 0),
      "Už je to tady! O2 arena se po roce a půl otevírá divákům s dlouho očekávanou a pompézní show QUEEN RELIVED by Queenie. Buďte u toho!",
      "https://content.aimatch.com/mafra/1881/172x129_final_24_8_mk.jpg",
    ),
  ]
}
