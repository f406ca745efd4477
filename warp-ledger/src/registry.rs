//! Name registry: maps short/alias names to canonical item ids and kinds.
//!
//! The registry is an immutable table built once and passed to whoever needs
//! it; there is no process-global cache. Lookups are case-folded so latin
//! aliases match regardless of capitalization. A small denylist marks
//! pseudo-characters that appear in source data but are never pullable.
use std::collections::{HashMap, HashSet};

use crate::record::ItemKind;

/// A successful name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    /// Canonical numeric item id.
    pub item_id: u32,
    /// Canonical (first-listed) name.
    pub name: String,
    pub kind: ItemKind,
}

struct ItemEntry {
    name: String,
    kind: ItemKind,
}

/// Immutable alias table with case-folded lookup.
pub struct NameRegistry {
    by_alias: HashMap<String, u32>,
    items: HashMap<u32, ItemEntry>,
    non_rollable: HashSet<u32>,
}

impl NameRegistry {
    /// Empty registry, for tests and custom tables.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_alias: HashMap::new(),
            items: HashMap::new(),
            non_rollable: HashSet::new(),
        }
    }

    /// Registry seeded with the built-in character and light-cone roster.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for &(id, names) in CHARACTERS {
            registry.insert(id, ItemKind::Character, names);
        }
        for &(id, names) in LIGHT_CONES {
            registry.insert(id, ItemKind::LightCone, names);
        }
        for &id in NON_ROLLABLE {
            registry.mark_non_rollable(id);
        }
        registry
    }

    /// Register an item under its canonical name plus any aliases.
    ///
    /// The first name listed becomes the canonical one. When two items claim
    /// the same alias the earlier registration wins, matching the source
    /// table's first-match semantics.
    pub fn insert(&mut self, item_id: u32, kind: ItemKind, names: &[&str]) {
        let canonical = names.first().copied().unwrap_or_default();
        self.items.insert(
            item_id,
            ItemEntry {
                name: canonical.to_string(),
                kind,
            },
        );
        for name in names {
            self.by_alias
                .entry(name.to_lowercase())
                .or_insert(item_id);
        }
    }

    /// Mark an id as present in source data but never actually pullable.
    pub fn mark_non_rollable(&mut self, item_id: u32) {
        self.non_rollable.insert(item_id);
    }

    /// Resolve a short or alias name to its canonical item.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ResolvedItem> {
        let item_id = *self.by_alias.get(&name.trim().to_lowercase())?;
        let entry = self.items.get(&item_id)?;
        Some(ResolvedItem {
            item_id,
            name: entry.name.clone(),
            kind: entry.kind,
        })
    }

    /// Whether the id can actually appear as a pull result.
    #[must_use]
    pub fn is_rollable(&self, item_id: u32) -> bool {
        !self.non_rollable.contains(&item_id)
    }

    /// Canonical name for an id, if registered.
    #[must_use]
    pub fn canonical_name(&self, item_id: u32) -> Option<&str> {
        self.items.get(&item_id).map(|entry| entry.name.as_str())
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Ids in the source roster that are not pullable (story-only placeholders
/// at the time the table was captured).
const NON_ROLLABLE: &[u32] = &[1306];

const CHARACTERS: &[(u32, &[&str])] = &[
    (8001, &["开拓者·毁灭"]),
    (8002, &["开拓者·毁灭"]),
    (8003, &["开拓者·存护"]),
    (8004, &["开拓者·存护"]),
    (1001, &["三月七", "mar7th", "三月", "小三月", "阿七", "37"]),
    (1002, &["丹恒", "danheng", "冷面小青龙", "闷葫芦"]),
    (1003, &["姬子", "himeko", "姬子阿姐", "寄子"]),
    (1004, &["瓦尔特", "welt", "瓦尔特杨", "杨叔", "老杨"]),
    (1005, &["卡芙卡", "kafka", "妈", "妈妈"]),
    (1006, &["银狼", "silverwolf", "小板鸭", "酷鸭", "超级骇客"]),
    (1008, &["阿兰", "arlan"]),
    (1009, &["艾丝妲", "asta", "富婆", "代理站长"]),
    (1013, &["黑塔", "herta", "天才俱乐部#83", "黑塔女士", "人偶"]),
    (1101, &["布洛妮娅", "bronya", "布洛妮娅兰德", "大板鸭", "渡鸭"]),
    (1102, &["希儿", "seele", "蝴蝶", "希尔"]),
    (1103, &["希露瓦", "serval", "希露瓦朗道", "贝洛伯格机械师"]),
    (1104, &["杰帕德", "gepard", "杰帕德朗道", "杰哥"]),
    (1105, &["娜塔莎", "natasha", "娜塔", "娜塔莎姐姐", "老巫婆"]),
    (1106, &["佩拉", "pela", "佩拉格娅", "冰砂糖"]),
    (1107, &["克拉拉", "clara", "猩红兔子", "史瓦罗"]),
    (1108, &["桑博", "sampo", "桑博科斯基", "深蓝帅哥"]),
    (1109, &["虎克", "hook", "胡克"]),
    (1110, &["玲可", "lynx"]),
    (1111, &["卢卡", "luka"]),
    (1112, &["托帕&账账", "topaz"]),
    (1201, &["青雀", "qingque", "克莱茵"]),
    (1202, &["停云", "tingyun", "屑狐狸", "停运"]),
    (1203, &["罗刹", "luocha", "主教"]),
    (1204, &["景元", "jingyuan", "云骑将军", "闭目将军"]),
    (1205, &["刃", "blade"]),
    (1206, &["素裳", "sushang", "李素裳"]),
    (1207, &["驭空", "yukong"]),
    (1208, &["符玄", "fuxuan", "typec"]),
    (1209, &["彦卿", "yanqing", "马彦卿", "燕青"]),
    (1210, &["桂乃芬", "guinaifen"]),
    (1211, &["白露", "bailu", "衔药龙女", "小龙女", "龙女"]),
    (1212, &["镜流", "jingliu"]),
    (1213, &["丹恒•饮月", "danhengil", "饮月君", "饮月"]),
    (1214, &["雪衣", "xueyi"]),
    (1215, &["寒鸦", "hanya"]),
    (1217, &["藿藿", "huohuo"]),
    (1302, &["银枝", "argenti"]),
    (1303, &["阮•梅", "ruanmei"]),
    (1305, &["真理医生", "drratio"]),
    (1306, &["花火", "sparkle"]),
    (1307, &["黑天鹅", "blackswan"]),
    (1312, &["米沙", "misha"]),
];

const LIGHT_CONES: &[(u32, &[&str])] = &[
    (20000, &["锋镝"]),
    (20001, &["物穰"]),
    (20002, &["天倾"]),
    (20003, &["琥珀"]),
    (20004, &["幽邃"]),
    (20005, &["齐颂"]),
    (20006, &["智库"]),
    (20007, &["离弦"]),
    (20008, &["嘉果"]),
    (20009, &["乐圮"]),
    (20010, &["戍御"]),
    (20011, &["渊环"]),
    (20012, &["轮契"]),
    (20013, &["灵钥"]),
    (20014, &["相抗"]),
    (20015, &["蕃息"]),
    (20016, &["俱殁"]),
    (20017, &["开疆"]),
    (20018, &["匿影"]),
    (20019, &["调和"]),
    (20020, &["睿见"]),
    (21000, &["一场术后对话"]),
    (21001, &["晚安与睡颜"]),
    (21002, &["余生的第一天"]),
    (21003, &["唯有沉默"]),
    (21004, &["记忆中的模样"]),
    (21005, &["鼹鼠党欢迎你"]),
    (21006, &["「我」的诞生"]),
    (21007, &["同一种心情"]),
    (21008, &["猎物的视线"]),
    (21009, &["朗道的选择"]),
    (21010, &["论剑"]),
    (21011, &["与行星相会"]),
    (21012, &["秘密誓心"]),
    (21013, &["别让世界静下来"]),
    (21014, &["此时恰好"]),
    (21015, &["决心如汗珠般闪耀"]),
    (21016, &["宇宙市场趋势"]),
    (21017, &["点个关注吧！"]),
    (21018, &["舞！舞！舞！"]),
    (21019, &["在蓝天下"]),
    (21020, &["天才们的休憩"]),
    (21021, &["等价交换"]),
    (21022, &["延长记号"]),
    (21023, &["我们是地火"]),
    (21024, &["春水初生"]),
    (21025, &["过往未来"]),
    (21026, &["汪！散步时间！"]),
    (21027, &["早餐的仪式感"]),
    (21028, &["暖夜不会漫长"]),
    (21029, &["后会有期"]),
    (21030, &["这就是我啦！"]),
    (21031, &["重返幽冥"]),
    (21032, &["镂月裁云之意"]),
    (21033, &["无处可逃"]),
    (21034, &["今日亦是和平的一日"]),
    (21035, &["何物为真"]),
    (21036, &["美梦小镇大冒险"]),
    (21037, &["最后的赢家"]),
    (21038, &["在火的远处"]),
    (21039, &["织造命运之线"]),
    (21040, &["银河沦陷日"]),
    (21041, &["好戏开演"]),
    (21042, &["铭记于心的约定"]),
    (22000, &["新手任务开始前"]),
    (22001, &["嘿，我在这儿"]),
    (23000, &["银河铁道之夜"]),
    (23001, &["于夜色中"]),
    (23002, &["无可取代的东西"]),
    (23003, &["但战斗还未结束"]),
    (23004, &["以世界之名"]),
    (23005, &["制胜的瞬间"]),
    (23006, &["只需等待"]),
    (23007, &["雨一直下"]),
    (23008, &["棺的回响"]),
    (23009, &["到不了的彼岸"]),
    (23010, &["拂晓之前"]),
    (23011, &["她已闭上双眼"]),
    (23012, &["如泥酣眠"]),
    (23013, &["时节不居"]),
    (23014, &["此身为剑"]),
    (23015, &["比阳光更明亮的"]),
    (23016, &["烦恼着，幸福着"]),
    (23017, &["惊魂夜"]),
    (23018, &["片刻，留在眼底"]),
    (23019, &["镜中故我"]),
    (23020, &["纯粹思维的洗礼"]),
    (23021, &["游戏尘寰"]),
    (23022, &["重塑时光之忆"]),
    (24000, &["记一位星神的陨落"]),
    (24001, &["星海巡航"]),
    (24002, &["记忆的质料"]),
    (24003, &["孤独的疗愈"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_and_alias_names() {
        let registry = NameRegistry::builtin();
        let direct = registry.resolve("希儿").unwrap();
        assert_eq!(direct.item_id, 1102);
        assert_eq!(direct.kind, ItemKind::Character);

        let alias = registry.resolve("Seele").unwrap();
        assert_eq!(alias.item_id, 1102);
        assert_eq!(alias.name, "希儿");
    }

    #[test]
    fn lookup_is_case_folded_and_trimmed() {
        let registry = NameRegistry::builtin();
        assert_eq!(registry.resolve(" KAFKA ").unwrap().item_id, 1005);
    }

    #[test]
    fn light_cones_resolve_with_their_kind() {
        let registry = NameRegistry::builtin();
        let cone = registry.resolve("银河铁道之夜").unwrap();
        assert_eq!(cone.item_id, 23000);
        assert_eq!(cone.kind, ItemKind::LightCone);
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let registry = NameRegistry::builtin();
        assert!(registry.resolve("不存在的角色").is_none());
    }

    #[test]
    fn denylisted_ids_resolve_but_are_not_rollable() {
        let registry = NameRegistry::builtin();
        let placeholder = registry.resolve("花火").unwrap();
        assert!(!registry.is_rollable(placeholder.item_id));
        assert!(registry.is_rollable(1102));
    }

    #[test]
    fn duplicate_alias_keeps_first_registration() {
        let mut registry = NameRegistry::empty();
        registry.insert(1, ItemKind::Character, &["同名"]);
        registry.insert(2, ItemKind::Character, &["同名"]);
        assert_eq!(registry.resolve("同名").unwrap().item_id, 1);
    }
}
